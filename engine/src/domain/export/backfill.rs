//! Asynchronous annotation backfill
//!
//! After a successful export, every originating span gets a
//! dataset-membership annotation. The write runs detached from the caller's
//! response and is strictly best-effort: failures are logged and swallowed,
//! never surfaced. A span the store cannot yet locate (ingestion lag) is
//! deferred onto a bounded retry channel consumed by a separate worker.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::data::error::DataError;
use crate::data::traits::{AnnotationQueue, InsertAnnotationParams, SpanStore};
use crate::data::types::{Annotation, DeferredAnnotation};

pub struct AnnotationBackfill {
    span_store: Arc<dyn SpanStore>,
    queue: Arc<dyn AnnotationQueue>,
    max_retries: u32,
}

impl AnnotationBackfill {
    pub fn new(
        span_store: Arc<dyn SpanStore>,
        queue: Arc<dyn AnnotationQueue>,
        max_retries: u32,
    ) -> Self {
        Self {
            span_store,
            queue,
            max_retries,
        }
    }

    /// Fork the backfill off the caller's request path. The caller's response
    /// returns before any of these writes complete; there is no join point.
    pub fn spawn(self: Arc<Self>, workspace_id: String, annotations: Vec<Annotation>) {
        if annotations.is_empty() {
            return;
        }
        tokio::spawn(async move {
            self.run(&workspace_id, annotations).await;
        });
    }

    async fn run(&self, workspace_id: &str, annotations: Vec<Annotation>) {
        for annotation in annotations {
            let params = InsertAnnotationParams {
                workspace_id: workspace_id.to_string(),
                tenant: None,
                annotation: annotation.clone(),
            };
            let Err(err) = self.span_store.insert_annotation(&params).await else {
                continue;
            };
            tracing::warn!(
                error = %err,
                span_id = %annotation.span_id,
                "Annotation write failed, deferring to retry channel"
            );
            let deferred = DeferredAnnotation {
                annotation,
                tenant: None,
                remaining_retries: self.max_retries,
            };
            if let Err(err) = self.queue.publish(deferred).await {
                tracing::warn!(error = %err, "Deferred annotation dropped");
            }
        }
    }
}

/// [`AnnotationQueue`] backed by a bounded in-process channel.
///
/// Publishing never blocks the producer: a full channel drops the payload
/// with a warning instead of applying backpressure to the export path.
pub struct ChannelAnnotationQueue {
    tx: mpsc::Sender<DeferredAnnotation>,
}

impl ChannelAnnotationQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DeferredAnnotation>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl AnnotationQueue for ChannelAnnotationQueue {
    async fn publish(&self, deferred: DeferredAnnotation) -> Result<(), DataError> {
        match self.tx.try_send(deferred) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                tracing::warn!(
                    span_id = %dropped.annotation.span_id,
                    "Annotation retry channel full, dropping payload"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DataError::QueueClosed),
        }
    }
}

/// Consume the retry channel until it closes.
///
/// Each payload carries its own remaining retry budget; a failed write with
/// budget left goes back on the queue with the counter decremented, and an
/// exhausted one is dropped silently.
pub async fn run_backfill_worker(
    mut rx: mpsc::Receiver<DeferredAnnotation>,
    span_store: Arc<dyn SpanStore>,
    queue: Arc<dyn AnnotationQueue>,
) {
    while let Some(deferred) = rx.recv().await {
        let params = InsertAnnotationParams {
            workspace_id: deferred.annotation.workspace_id.clone(),
            tenant: deferred.tenant.clone(),
            annotation: deferred.annotation.clone(),
        };
        match span_store.insert_annotation(&params).await {
            Ok(()) => {}
            Err(err) if deferred.remaining_retries > 0 => {
                tracing::debug!(
                    error = %err,
                    span_id = %deferred.annotation.span_id,
                    remaining = deferred.remaining_retries - 1,
                    "Deferred annotation write failed, requeueing"
                );
                let requeued = DeferredAnnotation {
                    remaining_retries: deferred.remaining_retries - 1,
                    ..deferred
                };
                if let Err(err) = queue.publish(requeued).await {
                    tracing::warn!(error = %err, "Requeue failed, annotation dropped");
                }
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    span_id = %deferred.annotation.span_id,
                    "Annotation retry budget exhausted, dropping"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::traits::{
        GetPreSpanIdsParams, GetTraceParams, ListSpansParams, ListSpansResult,
    };
    use crate::data::types::{AnnotationType, Span};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Store that fails the first `failures` insert calls, then succeeds.
    struct FlakyStore {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SpanStore for FlakyStore {
        async fn list_spans(&self, _params: &ListSpansParams) -> Result<ListSpansResult, DataError> {
            Ok(ListSpansResult::default())
        }

        async fn get_trace(&self, _params: &GetTraceParams) -> Result<Vec<Span>, DataError> {
            Ok(vec![])
        }

        async fn get_pre_span_ids(
            &self,
            _params: &GetPreSpanIdsParams,
        ) -> Result<(Vec<String>, Vec<String>), DataError> {
            Ok((vec![], vec![]))
        }

        async fn insert_annotation(&self, _params: &InsertAnnotationParams) -> Result<(), DataError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(DataError::Store("span not found".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn annotation(span_id: &str) -> Annotation {
        Annotation::dataset_membership(
            span_id,
            "trace-1",
            "ws-1",
            Utc::now(),
            7,
            "user-1",
            AnnotationType::ManualDataset,
        )
    }

    async fn wait_for_calls(store: &FlakyStore, expected: usize) {
        for _ in 0..100 {
            if store.calls.load(Ordering::SeqCst) >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} insert calls, saw {}",
            store.calls.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_successful_write_skips_queue() {
        let store = Arc::new(FlakyStore::new(0));
        let (queue, mut rx) = ChannelAnnotationQueue::new(4);
        let backfill = Arc::new(AnnotationBackfill::new(
            store.clone(),
            Arc::new(queue),
            3,
        ));

        backfill.spawn("ws-1".to_string(), vec![annotation("s1")]);
        wait_for_calls(&store, 1).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_write_is_deferred_with_budget() {
        let store = Arc::new(FlakyStore::new(usize::MAX));
        let (queue, mut rx) = ChannelAnnotationQueue::new(4);
        let backfill = Arc::new(AnnotationBackfill::new(
            store.clone(),
            Arc::new(queue),
            3,
        ));

        backfill.spawn("ws-1".to_string(), vec![annotation("s1")]);
        wait_for_calls(&store, 1).await;
        let deferred = rx.recv().await.unwrap();
        assert_eq!(deferred.remaining_retries, 3);
        assert_eq!(deferred.annotation.span_id, "s1");
    }

    #[tokio::test]
    async fn test_worker_retries_until_success() {
        // First two inserts fail, third succeeds
        let store = Arc::new(FlakyStore::new(2));
        let (queue, rx) = ChannelAnnotationQueue::new(8);
        let queue = Arc::new(queue);

        let worker = tokio::spawn(run_backfill_worker(
            rx,
            store.clone(),
            queue.clone(),
        ));

        queue
            .publish(DeferredAnnotation {
                annotation: annotation("s1"),
                tenant: None,
                remaining_retries: 3,
            })
            .await
            .unwrap();

        wait_for_calls(&store, 3).await;
        worker.abort();
    }

    #[tokio::test]
    async fn test_worker_drops_after_budget_exhausted() {
        let store = Arc::new(FlakyStore::new(usize::MAX));
        let (queue, rx) = ChannelAnnotationQueue::new(8);
        let queue = Arc::new(queue);

        let worker = tokio::spawn(run_backfill_worker(
            rx,
            store.clone(),
            queue.clone(),
        ));

        queue
            .publish(DeferredAnnotation {
                annotation: annotation("s1"),
                tenant: None,
                remaining_retries: 2,
            })
            .await
            .unwrap();

        // Initial attempt plus two retries, then the payload is dropped
        wait_for_calls(&store, 3).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        worker.abort();
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_error() {
        let (queue, _rx) = ChannelAnnotationQueue::new(1);
        queue
            .publish(DeferredAnnotation {
                annotation: annotation("s1"),
                tenant: None,
                remaining_retries: 1,
            })
            .await
            .unwrap();
        // Channel is full now; publish still succeeds, payload is dropped
        queue
            .publish(DeferredAnnotation {
                annotation: annotation("s2"),
                tenant: None,
                remaining_retries: 1,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_channel_errors() {
        let (queue, rx) = ChannelAnnotationQueue::new(1);
        drop(rx);
        let err = queue
            .publish(DeferredAnnotation {
                annotation: annotation("s1"),
                tenant: None,
                remaining_retries: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::QueueClosed));
    }
}
