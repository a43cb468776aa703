//! Collaborator traits
//!
//! The engine never talks to concrete storage: the span store, the dataset
//! destinations, tenant routing, trajectory-rule persistence, and the
//! deferred-annotation queue are all injected behind these traits.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::data::error::DataError;
use crate::data::types::{
    Annotation, Dataset, DatasetCategory, DatasetItem, DeferredAnnotation, FilterExpression,
    ItemErrorGroup, PlatformType, Span,
};

// =============================================================================
// Span Store
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct ListSpansParams {
    pub workspace_id: String,
    pub tenants: Vec<String>,
    pub filters: Option<FilterExpression>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub limit: u32,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListSpansResult {
    pub spans: Vec<Span>,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GetTraceParams {
    pub workspace_id: String,
    pub tenants: Vec<String>,
    pub trace_id: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct GetPreSpanIdsParams {
    pub workspace_id: String,
    pub tenants: Vec<String>,
    pub trace_id: String,
    pub span_id: String,
    pub previous_response_id: String,
    pub start_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct InsertAnnotationParams {
    pub workspace_id: String,
    pub tenant: Option<String>,
    pub annotation: Annotation,
}

/// The persistent span store (read path plus annotation append).
#[async_trait]
pub trait SpanStore: Send + Sync {
    async fn list_spans(&self, params: &ListSpansParams) -> Result<ListSpansResult, DataError>;

    async fn get_trace(&self, params: &GetTraceParams) -> Result<Vec<Span>, DataError>;

    /// Walk the previous-response linkage index for the given starting span.
    /// Returns the ordered chain span ids and their response ids, index-aligned.
    async fn get_pre_span_ids(
        &self,
        params: &GetPreSpanIdsParams,
    ) -> Result<(Vec<String>, Vec<String>), DataError>;

    async fn insert_annotation(&self, params: &InsertAnnotationParams) -> Result<(), DataError>;
}

// =============================================================================
// Tenant Resolution
// =============================================================================

/// Maps a platform type to the storage tenants its data lives in.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    async fn tenants_for(&self, platform: &PlatformType) -> Result<Vec<String>, DataError>;
}

// =============================================================================
// Trajectory Rule Persistence
// =============================================================================

/// Per-workspace trajectory-inclusion rules.
#[async_trait]
pub trait TrajectoryConfigStore: Send + Sync {
    async fn get_trajectory_config(
        &self,
        workspace_id: &str,
    ) -> Result<Option<FilterExpression>, DataError>;

    async fn upsert_trajectory_config(
        &self,
        workspace_id: &str,
        filter: &FilterExpression,
        user_id: &str,
    ) -> Result<(), DataError>;
}

// =============================================================================
// Dataset Providers
// =============================================================================

/// One dataset destination (per dataset category).
#[async_trait]
pub trait DatasetProvider: Send + Sync {
    /// Create a dataset; returns the new dataset id.
    async fn create_dataset(&self, dataset: &Dataset) -> Result<i64, DataError>;

    async fn update_dataset_schema(&self, dataset: &Dataset) -> Result<(), DataError>;

    async fn get_dataset(
        &self,
        workspace_id: &str,
        dataset_id: i64,
        category: DatasetCategory,
    ) -> Result<Dataset, DataError>;

    async fn clear_dataset_items(
        &self,
        workspace_id: &str,
        dataset_id: i64,
        category: DatasetCategory,
    ) -> Result<(), DataError>;

    /// Validate and insert; returns the accepted items plus error groups for
    /// the rejected ones.
    async fn add_dataset_items(
        &self,
        dataset: &Dataset,
        items: Vec<DatasetItem>,
    ) -> Result<(Vec<DatasetItem>, Vec<ItemErrorGroup>), DataError>;

    /// Validation only, no writes. `ignore_current_count` relaxes capacity
    /// checks when the caller will clear the destination first.
    async fn validate_dataset_items(
        &self,
        dataset: &Dataset,
        items: Vec<DatasetItem>,
        ignore_current_count: bool,
    ) -> Result<(Vec<DatasetItem>, Vec<ItemErrorGroup>), DataError>;
}

/// Category → provider registry.
///
/// Unregistered categories resolve to a fallback provider that rejects every
/// call with a [`DataError::Provider`] error, so a misconfigured category
/// fails loudly instead of dereferencing a missing handle.
pub struct DatasetProviderRegistry {
    providers: HashMap<DatasetCategory, Arc<dyn DatasetProvider>>,
    fallback: Arc<dyn DatasetProvider>,
}

impl Default for DatasetProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            fallback: Arc::new(UnregisteredDatasetProvider),
        }
    }

    pub fn register(&mut self, category: DatasetCategory, provider: Arc<dyn DatasetProvider>) {
        self.providers.insert(category, provider);
    }

    pub fn get(&self, category: DatasetCategory) -> Arc<dyn DatasetProvider> {
        self.providers
            .get(&category)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Fallback provider for categories nothing registered.
struct UnregisteredDatasetProvider;

impl UnregisteredDatasetProvider {
    fn err(category: DatasetCategory) -> DataError {
        DataError::Provider(format!(
            "no dataset provider registered for category '{category}'"
        ))
    }
}

#[async_trait]
impl DatasetProvider for UnregisteredDatasetProvider {
    async fn create_dataset(&self, dataset: &Dataset) -> Result<i64, DataError> {
        Err(Self::err(dataset.category))
    }

    async fn update_dataset_schema(&self, dataset: &Dataset) -> Result<(), DataError> {
        Err(Self::err(dataset.category))
    }

    async fn get_dataset(
        &self,
        _workspace_id: &str,
        _dataset_id: i64,
        category: DatasetCategory,
    ) -> Result<Dataset, DataError> {
        Err(Self::err(category))
    }

    async fn clear_dataset_items(
        &self,
        _workspace_id: &str,
        _dataset_id: i64,
        category: DatasetCategory,
    ) -> Result<(), DataError> {
        Err(Self::err(category))
    }

    async fn add_dataset_items(
        &self,
        dataset: &Dataset,
        _items: Vec<DatasetItem>,
    ) -> Result<(Vec<DatasetItem>, Vec<ItemErrorGroup>), DataError> {
        Err(Self::err(dataset.category))
    }

    async fn validate_dataset_items(
        &self,
        dataset: &Dataset,
        _items: Vec<DatasetItem>,
        _ignore_current_count: bool,
    ) -> Result<(Vec<DatasetItem>, Vec<ItemErrorGroup>), DataError> {
        Err(Self::err(dataset.category))
    }
}

// =============================================================================
// Annotation Queue
// =============================================================================

/// Accepts deferred annotation writes for later retry.
#[async_trait]
pub trait AnnotationQueue: Send + Sync {
    async fn publish(&self, deferred: DeferredAnnotation) -> Result<(), DataError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unregistered_category_fails_loudly() {
        let registry = DatasetProviderRegistry::new();
        let provider = registry.get(DatasetCategory::Evaluation);
        let err = provider
            .get_dataset("ws", 1, DatasetCategory::Evaluation)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no dataset provider registered"));
    }

    #[tokio::test]
    async fn test_registered_provider_wins() {
        struct Fixed;

        #[async_trait]
        impl DatasetProvider for Fixed {
            async fn create_dataset(&self, _dataset: &Dataset) -> Result<i64, DataError> {
                Ok(99)
            }
            async fn update_dataset_schema(&self, _dataset: &Dataset) -> Result<(), DataError> {
                Ok(())
            }
            async fn get_dataset(
                &self,
                workspace_id: &str,
                dataset_id: i64,
                category: DatasetCategory,
            ) -> Result<Dataset, DataError> {
                Ok(Dataset::new(
                    dataset_id,
                    workspace_id,
                    "fixed",
                    category,
                    Default::default(),
                ))
            }
            async fn clear_dataset_items(
                &self,
                _workspace_id: &str,
                _dataset_id: i64,
                _category: DatasetCategory,
            ) -> Result<(), DataError> {
                Ok(())
            }
            async fn add_dataset_items(
                &self,
                _dataset: &Dataset,
                items: Vec<DatasetItem>,
            ) -> Result<(Vec<DatasetItem>, Vec<ItemErrorGroup>), DataError> {
                Ok((items, vec![]))
            }
            async fn validate_dataset_items(
                &self,
                _dataset: &Dataset,
                items: Vec<DatasetItem>,
                _ignore_current_count: bool,
            ) -> Result<(Vec<DatasetItem>, Vec<ItemErrorGroup>), DataError> {
                Ok((items, vec![]))
            }
        }

        let mut registry = DatasetProviderRegistry::new();
        registry.register(DatasetCategory::General, Arc::new(Fixed));
        let id = registry
            .get(DatasetCategory::General)
            .create_dataset(&Dataset::default())
            .await
            .unwrap();
        assert_eq!(id, 99);
    }
}
