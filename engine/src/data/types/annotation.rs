//! Span annotations
//!
//! The engine only ever appends dataset-membership annotations: after a span
//! is exported into a dataset, the originating span is tagged so the UI can
//! show where it already landed and users are not pushed into duplicate
//! re-imports.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What produced an annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationType {
    ManualDataset,
    ManualEvaluationSet,
}

impl AnnotationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationType::ManualDataset => "manual_dataset",
            AnnotationType::ManualEvaluationSet => "manual_evaluation_set",
        }
    }
}

/// One annotation attached to a span.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Annotation {
    /// Deterministic id derived from (span, trace, type, key)
    pub id: String,
    pub span_id: String,
    pub trace_id: String,
    pub workspace_id: String,
    /// Start time of the annotated span
    pub start_time: DateTime<Utc>,
    pub annotation_type: AnnotationType,
    /// Dataset-membership annotations use the dataset id as key
    pub key: String,
    pub value: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Annotation {
    /// Build a dataset-membership annotation for `span`.
    ///
    /// The id is content-derived so that re-exporting the same span into the
    /// same dataset upserts rather than duplicates.
    pub fn dataset_membership(
        span_id: &str,
        trace_id: &str,
        workspace_id: &str,
        start_time: DateTime<Utc>,
        dataset_id: i64,
        user_id: &str,
        annotation_type: AnnotationType,
    ) -> Self {
        let key = dataset_id.to_string();
        let id = gen_annotation_id(span_id, trace_id, annotation_type, &key);
        Self {
            id,
            span_id: span_id.to_string(),
            trace_id: trace_id.to_string(),
            workspace_id: workspace_id.to_string(),
            start_time,
            annotation_type,
            key: key.clone(),
            value: key,
            created_by: user_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// sha256 over `span_id:trace_id:type:key`, hex-encoded.
fn gen_annotation_id(
    span_id: &str,
    trace_id: &str,
    annotation_type: AnnotationType,
    key: &str,
) -> String {
    let mut input = String::new();
    let _ = write!(
        input,
        "{}:{}:{}:{}",
        span_id,
        trace_id,
        annotation_type.as_str(),
        key
    );
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// A deferred annotation write, carried on the retry channel with the target
/// span's identity and the remaining retry budget.
#[derive(Debug, Clone)]
pub struct DeferredAnnotation {
    pub annotation: Annotation,
    pub tenant: Option<String>,
    pub remaining_retries: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(span_id: &str, dataset_id: i64) -> Annotation {
        Annotation::dataset_membership(
            span_id,
            "trace-1",
            "ws-1",
            Utc::now(),
            dataset_id,
            "user-1",
            AnnotationType::ManualDataset,
        )
    }

    #[test]
    fn test_id_is_deterministic() {
        let a = make("span-1", 42);
        let b = make("span-1", 42);
        assert_eq!(a.id, b.id);
        assert_eq!(a.id.len(), 64);
    }

    #[test]
    fn test_id_varies_by_span_and_dataset() {
        let a = make("span-1", 42);
        let b = make("span-2", 42);
        let c = make("span-1", 43);
        assert_ne!(a.id, b.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn test_key_is_dataset_id() {
        let a = make("span-1", 7);
        assert_eq!(a.key, "7");
        assert_eq!(a.value, "7");
    }
}
