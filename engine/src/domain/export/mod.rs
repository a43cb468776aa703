//! Dataset export materializer
//!
//! Maps selected spans (and their precomputed trajectories) into destination
//! dataset items: resolves the destination, evaluates field mappings,
//! buckets items by build errors, writes through the category's provider,
//! and hands successfully written items to the annotation backfill.
//!
//! Field- and item-level failures never abort an export; they are captured
//! per item and aggregated into bounded error groups. Pipeline and store
//! failures abort the whole request with no partial result.

pub mod backfill;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::core::EngineConfig;
use crate::core::constants::{
    ERROR_DETAIL_CAP_IMPORT_JOB, ERROR_DETAIL_CAP_INTERACTIVE, FIELD_SPAN_ID, FIELD_TRACE_ID,
};
use crate::data::traits::{
    DatasetProviderRegistry, ListSpansParams, SpanStore, TenantResolver,
};
use crate::data::types::{
    Annotation, AnnotationType, Dataset, DatasetCategory, DatasetItem, DatasetSchema, FieldMapping,
    FilterExpression, FilterField, ItemErrorGroup, ItemErrorKind, ItemSource, PlatformType, Span,
    Trajectory, content_info, merge_error_groups,
};
use crate::domain::export::backfill::AnnotationBackfill;
use crate::domain::processing::{PipelineBuilder, Settings};
use crate::domain::trajectory::TrajectoryService;
use crate::error::{EngineError, EngineResult};

// =============================================================================
// Requests & Results
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportType {
    /// Keep existing destination items
    Append,
    /// Clear a pre-existing destination before writing
    Overwrite,
}

/// One requested (trace, span) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanRef {
    pub trace_id: String,
    pub span_id: String,
}

/// Destination dataset: an existing id, or the shape of a dataset to create.
#[derive(Debug, Clone, Default)]
pub struct ExportTarget {
    pub dataset_id: Option<i64>,
    pub dataset_name: String,
    pub category: DatasetCategory,
    pub schema: DatasetSchema,
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub workspace_id: String,
    pub platform: PlatformType,
    pub span_refs: Vec<SpanRef>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub field_mappings: Vec<FieldMapping>,
    pub export_type: ExportType,
    pub target: ExportTarget,
    pub user_id: String,
    /// Import job that issued this export, when any; selects the larger
    /// error-detail cap and is carried as item lineage
    pub import_job_id: Option<i64>,
}

impl ExportRequest {
    fn detail_cap(&self) -> usize {
        if self.import_job_id.is_some() {
            ERROR_DETAIL_CAP_IMPORT_JOB
        } else {
            ERROR_DETAIL_CAP_INTERACTIVE
        }
    }

    fn item_source(&self) -> Option<ItemSource> {
        self.import_job_id.map(|job_id| ItemSource {
            job_id: Some(job_id),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ExportResult {
    pub success_count: u32,
    pub error_groups: Vec<ItemErrorGroup>,
    pub dataset_id: i64,
    pub dataset_name: String,
}

#[derive(Debug, Clone)]
pub struct PreviewResult {
    pub items: Vec<DatasetItem>,
    pub error_groups: Vec<ItemErrorGroup>,
}

/// A resolved destination plus whether this request created it.
struct Destination {
    dataset: Dataset,
    created: bool,
}

// =============================================================================
// Service
// =============================================================================

pub struct ExportService {
    span_store: Arc<dyn SpanStore>,
    tenant_resolver: Arc<dyn TenantResolver>,
    providers: Arc<DatasetProviderRegistry>,
    trajectories: Arc<TrajectoryService>,
    pipelines: Arc<PipelineBuilder>,
    backfill: Arc<AnnotationBackfill>,
    config: EngineConfig,
}

impl ExportService {
    pub fn new(
        span_store: Arc<dyn SpanStore>,
        tenant_resolver: Arc<dyn TenantResolver>,
        providers: Arc<DatasetProviderRegistry>,
        trajectories: Arc<TrajectoryService>,
        pipelines: Arc<PipelineBuilder>,
        backfill: Arc<AnnotationBackfill>,
        config: EngineConfig,
    ) -> Self {
        Self {
            span_store,
            tenant_resolver,
            providers,
            trajectories,
            pipelines,
            backfill,
            config,
        }
    }

    /// Materialize the requested spans into the destination dataset.
    ///
    /// Concurrent overwrite exports against the same destination are not
    /// serialized here; the provider's own validation is the only guard.
    pub async fn export_traces_to_dataset(&self, req: &ExportRequest) -> EngineResult<ExportResult> {
        let spans = self.get_spans(req).await?;
        let trajectories = self.trajectories_for(req, &spans).await?;

        let provider = self.providers.get(req.target.category);
        let destination = self.create_or_update_dataset(req, provider.as_ref()).await?;
        let dataset = &destination.dataset;

        let items = build_dataset_items(req, dataset, &spans, &trajectories);
        let (success, failed, all) = bucket_items(items);
        tracing::info!(
            dataset_id = dataset.id,
            success = success.len(),
            failed = failed.len(),
            "Built dataset items"
        );

        // Overwrite clears only a pre-existing destination; a dataset this
        // request just created has nothing to clear.
        if req.export_type == ExportType::Overwrite && !destination.created {
            provider
                .clear_dataset_items(&req.workspace_id, dataset.id, dataset.category)
                .await?;
        }

        let (written, provider_groups) = if success.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            provider.add_dataset_items(dataset, success).await?
        };
        let error_groups = merge_error_groups(&all, provider_groups, req.detail_cap());

        self.backfill.clone().spawn(
            req.workspace_id.clone(),
            membership_annotations(req, dataset, &written, &spans),
        );

        Ok(ExportResult {
            success_count: written.len() as u32,
            error_groups,
            dataset_id: dataset.id,
            dataset_name: dataset.name.clone(),
        })
    }

    /// Dry-run: build and validate items without writing or mutating the
    /// destination.
    pub async fn preview_export_traces_to_dataset(
        &self,
        req: &ExportRequest,
    ) -> EngineResult<PreviewResult> {
        let spans = self.get_spans(req).await?;
        let trajectories = self.trajectories_for(req, &spans).await?;

        let provider = self.providers.get(req.target.category);
        // Previews never consult the provider for the destination shape: the
        // dataset is rebuilt from the request's declared schema, with display
        // names standing in for unassigned keys
        let dataset = preview_dataset(req);

        let items = build_dataset_items(req, &dataset, &spans, &trajectories);
        let (success, _failed, all) = bucket_items(items);

        // Capacity checks relax only when an overwrite of a pre-existing
        // destination would clear it first
        let ignore_current_count =
            req.target.dataset_id.is_some() && req.export_type == ExportType::Overwrite;
        let (_valid, provider_groups) = if success.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            provider
                .validate_dataset_items(&dataset, success, ignore_current_count)
                .await?
        };
        let error_groups = merge_error_groups(&all, provider_groups, req.detail_cap());

        Ok(PreviewResult {
            items: all,
            error_groups,
        })
    }

    // =========================================================================
    // Span retrieval
    // =========================================================================

    /// Fetch the requested (trace, span) pairs and return them in request
    /// order. No matching span at all is a not-found error.
    async fn get_spans(&self, req: &ExportRequest) -> EngineResult<Vec<Span>> {
        if req.span_refs.is_empty() {
            return Err(EngineError::InvalidParameter(
                "no spans requested for export".to_string(),
            ));
        }
        let tenants = self.tenant_resolver.tenants_for(&req.platform).await?;
        let start_at = self.clamp_start(req);

        let mut trace_ids: Vec<String> = req.span_refs.iter().map(|r| r.trace_id.clone()).collect();
        trace_ids.sort();
        trace_ids.dedup();
        let span_ids: Vec<String> = req.span_refs.iter().map(|r| r.span_id.clone()).collect();

        // Trace filters are cheap compared to span-id point lookups; the
        // doubled limit absorbs span-id collisions across traces.
        let result = self
            .span_store
            .list_spans(&ListSpansParams {
                workspace_id: req.workspace_id.clone(),
                tenants,
                filters: Some(FilterExpression::and(vec![
                    FilterField::in_list(FIELD_TRACE_ID, trace_ids),
                    FilterField::in_list(FIELD_SPAN_ID, span_ids),
                ])),
                start_at: Some(start_at),
                end_at: Some(req.end_at),
                limit: (req.span_refs.len() * 2) as u32,
                page_token: None,
            })
            .await?;

        let mut by_ref: HashMap<(String, String), Span> = result
            .spans
            .into_iter()
            .map(|s| ((s.trace_id.clone(), s.span_id.clone()), s))
            .collect();
        let mut spans = Vec::with_capacity(req.span_refs.len());
        for r in &req.span_refs {
            if let Some(span) = by_ref.remove(&(r.trace_id.clone(), r.span_id.clone())) {
                spans.push(span);
            }
        }
        if spans.is_empty() {
            return Err(EngineError::ResourceNotFound(
                "no spans match the requested ids and time range".to_string(),
            ));
        }

        let settings = Settings {
            workspace_id: req.workspace_id.clone(),
            platform: req.platform.clone(),
            query_start: Some(start_at),
            query_end: Some(req.end_at),
        };
        self.pipelines.build_export(&settings)?.run(spans)
    }

    /// Oldest queryable instant for the platform's retention window.
    fn retention_horizon(&self, platform: &PlatformType) -> DateTime<Utc> {
        let age_days = self.config.max_trace_age_days_for(platform);
        Utc::now() - Duration::days(age_days)
    }

    /// Clamp the query window to the platform's retention horizon.
    fn clamp_start(&self, req: &ExportRequest) -> DateTime<Utc> {
        req.start_at.max(self.retention_horizon(&req.platform))
    }

    /// Trajectories for every trace in the batch, when any mapping needs one.
    async fn trajectories_for(
        &self,
        req: &ExportRequest,
        spans: &[Span],
    ) -> EngineResult<HashMap<String, Trajectory>> {
        if !req.field_mappings.iter().any(FieldMapping::is_trajectory) {
            return Ok(HashMap::new());
        }
        let mut trace_ids: Vec<String> = spans.iter().map(|s| s.trace_id.clone()).collect();
        trace_ids.sort();
        trace_ids.dedup();
        // Trajectory spans may predate the requested window; scan from the
        // retention horizon instead of the caller's start time
        self.trajectories
            .get_trajectories(
                &req.workspace_id,
                &trace_ids,
                self.retention_horizon(&req.platform),
                req.end_at,
                &req.platform,
            )
            .await
    }

    // =========================================================================
    // Destination resolution
    // =========================================================================

    /// Create a new destination or lazily backfill an existing one's field
    /// keys, then re-fetch so mapping resolution sees assigned keys.
    async fn create_or_update_dataset(
        &self,
        req: &ExportRequest,
        provider: &dyn crate::data::traits::DatasetProvider,
    ) -> EngineResult<Destination> {
        let (dataset_id, created) = match req.target.dataset_id {
            Some(id) => {
                let existing = provider
                    .get_dataset(&req.workspace_id, id, req.target.category)
                    .await?;
                let missing_key = existing
                    .schema
                    .field_schemas
                    .iter()
                    .any(|fs| fs.key.as_deref().unwrap_or("").is_empty());
                if missing_key {
                    let desired = Dataset::new(
                        id,
                        &req.workspace_id,
                        &existing.name,
                        req.target.category,
                        req.target.schema.clone(),
                    );
                    provider.update_dataset_schema(&desired).await?;
                }
                (id, false)
            }
            None => {
                if req.target.dataset_name.is_empty() {
                    return Err(EngineError::InvalidParameter(
                        "dataset name is required to create a dataset".to_string(),
                    ));
                }
                if req.target.schema.field_schemas.is_empty() {
                    return Err(EngineError::InvalidParameter(
                        "dataset schema is required to create a dataset".to_string(),
                    ));
                }
                let dataset = Dataset::new(
                    0,
                    &req.workspace_id,
                    &req.target.dataset_name,
                    req.target.category,
                    req.target.schema.clone(),
                );
                let id = provider.create_dataset(&dataset).await?;
                tracing::info!(dataset_id = id, name = %req.target.dataset_name, "Created dataset");
                (id, true)
            }
        };
        // Field keys are provider-assigned; only a re-fetch exposes them
        let dataset = provider
            .get_dataset(&req.workspace_id, dataset_id, req.target.category)
            .await?;
        Ok(Destination { dataset, created })
    }
}

// =============================================================================
// Item construction
// =============================================================================

/// Preview destination built from the request's declared schema alone, with
/// the supplied id carried through and missing field keys defaulted to the
/// field's display name. A key-less existing destination still previews.
fn preview_dataset(req: &ExportRequest) -> Dataset {
    let mut schema = req.target.schema.clone();
    for fs in &mut schema.field_schemas {
        if fs.key.as_deref().unwrap_or("").is_empty() {
            fs.key = Some(fs.name.clone());
        }
    }
    Dataset::new(
        req.target.dataset_id.unwrap_or(0),
        &req.workspace_id,
        &req.target.dataset_name,
        req.target.category,
        schema,
    )
}

/// One item per span; one field per mapping. Failures attach to the item
/// instead of aborting the batch.
fn build_dataset_items(
    req: &ExportRequest,
    dataset: &Dataset,
    spans: &[Span],
    trajectories: &HashMap<String, Trajectory>,
) -> Vec<DatasetItem> {
    let source = req.item_source();
    let mut items = Vec::with_capacity(spans.len());
    for span in spans {
        let mut item = DatasetItem::from_span(&req.workspace_id, dataset.id, span, source.clone());
        for mapping in &req.field_mappings {
            let field_name = mapping.field_schema.name.clone();
            let value = extract_field_value(mapping, span, trajectories, &mut item, &field_name);

            let content = match content_info(mapping.field_schema.content_type, &value) {
                Ok(content) => content,
                Err(kind) => {
                    item.add_error(
                        kind,
                        &format!("field '{field_name}' does not match its declared content type"),
                        vec![field_name],
                    );
                    continue;
                }
            };
            let Some(key) = dataset.field_key_by_name(&field_name) else {
                item.add_error(
                    ItemErrorKind::InternalError,
                    &format!("field '{field_name}' has no key in the destination schema"),
                    vec![field_name],
                );
                continue;
            };
            item.add_field_data(key, &mapping.field_schema.name, content);
        }
        items.push(item);
    }
    items
}

/// Raw value for one mapping: the serialized trajectory, or a (span-field,
/// jsonpath) extraction. Jsonpath failure over non-JSON content resolves to
/// an empty value; a missing or unserializable trajectory additionally marks
/// the item with an internal error.
fn extract_field_value(
    mapping: &FieldMapping,
    span: &Span,
    trajectories: &HashMap<String, Trajectory>,
    item: &mut DatasetItem,
    field_name: &str,
) -> String {
    if mapping.is_trajectory() {
        match trajectories.get(&span.trace_id) {
            Some(trajectory) => match trajectory.to_json_string() {
                Ok(json) => json,
                Err(err) => {
                    tracing::warn!(trace_id = %span.trace_id, error = %err, "Trajectory serialization failed");
                    item.add_error(
                        ItemErrorKind::InternalError,
                        "trajectory serialization failed",
                        vec![field_name.to_string()],
                    );
                    String::new()
                }
            },
            None => {
                item.add_error(
                    ItemErrorKind::InternalError,
                    &format!("no trajectory for trace '{}'", span.trace_id),
                    vec![field_name.to_string()],
                );
                String::new()
            }
        }
    } else {
        span.extract_by_jsonpath(&mapping.span_field_key, &mapping.span_field_jsonpath)
            .unwrap_or_default()
    }
}

/// `(success, failed, all)`: items with any error never enter the write
/// batch but always appear in the preview batch.
fn bucket_items(items: Vec<DatasetItem>) -> (Vec<DatasetItem>, Vec<DatasetItem>, Vec<DatasetItem>) {
    let all = items.clone();
    let (failed, success): (Vec<_>, Vec<_>) = items.into_iter().partition(DatasetItem::has_errors);
    (success, failed, all)
}

/// Dataset-membership annotations for the items the destination accepted.
fn membership_annotations(
    req: &ExportRequest,
    dataset: &Dataset,
    written: &[DatasetItem],
    spans: &[Span],
) -> Vec<Annotation> {
    let annotation_type = match dataset.category {
        DatasetCategory::General => AnnotationType::ManualDataset,
        DatasetCategory::Evaluation => AnnotationType::ManualEvaluationSet,
    };
    let by_span_id: HashMap<&str, &Span> = spans.iter().map(|s| (s.span_id.as_str(), s)).collect();
    written
        .iter()
        .filter_map(|item| by_span_id.get(item.span_id.as_str()))
        .map(|span| {
            Annotation::dataset_membership(
                &span.span_id,
                &span.trace_id,
                &req.workspace_id,
                span.start_time,
                dataset.id,
                &req.user_id,
                annotation_type,
            )
        })
        .collect()
}
