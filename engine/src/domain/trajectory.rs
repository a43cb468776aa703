//! Trajectory reconstruction service
//!
//! Rebuilds hierarchical execution trajectories from the flat span records a
//! trace query returns. Two span sets feed each trace: the full descendant
//! set (`all`, used for tree linkage and root detection) and a selection
//! subset pulled by the workspace's trajectory rule, widened so explicitly
//! selected nodes are never dropped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::EngineConfig;
use crate::core::constants::{
    FIELD_SPAN_ID, FIELD_SPAN_TYPE, FIELD_TRACE_ID, SPAN_TYPE_AGENT, SPAN_TYPE_GRAPH,
    TRAJECTORY_SPAN_FETCH_LIMIT,
};
use crate::data::traits::{ListSpansParams, SpanStore, TenantResolver, TrajectoryConfigStore};
use crate::data::types::{
    FilterExpression, FilterField, PlatformType, Span, Trajectory, build_trajectory,
};
use crate::domain::processing::{PipelineBuilder, Settings};
use crate::error::EngineResult;

pub struct TrajectoryService {
    span_store: Arc<dyn SpanStore>,
    tenant_resolver: Arc<dyn TenantResolver>,
    config_store: Arc<dyn TrajectoryConfigStore>,
    pipelines: Arc<PipelineBuilder>,
    config: EngineConfig,
}

impl TrajectoryService {
    pub fn new(
        span_store: Arc<dyn SpanStore>,
        tenant_resolver: Arc<dyn TenantResolver>,
        config_store: Arc<dyn TrajectoryConfigStore>,
        pipelines: Arc<PipelineBuilder>,
        config: EngineConfig,
    ) -> Self {
        Self {
            span_store,
            tenant_resolver,
            config_store,
            pipelines,
            config,
        }
    }

    /// The workspace's configured trajectory rule, if any.
    pub async fn get_trajectory_config(
        &self,
        workspace_id: &str,
    ) -> EngineResult<Option<FilterExpression>> {
        Ok(self.config_store.get_trajectory_config(workspace_id).await?)
    }

    pub async fn upsert_trajectory_config(
        &self,
        workspace_id: &str,
        filter: &FilterExpression,
        user_id: &str,
    ) -> EngineResult<()> {
        filter.validate()?;
        self.config_store
            .upsert_trajectory_config(workspace_id, filter, user_id)
            .await?;
        Ok(())
    }

    /// Reconstruct one trajectory per requested trace.
    pub async fn get_trajectories(
        &self,
        workspace_id: &str,
        trace_ids: &[String],
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
        platform: &PlatformType,
    ) -> EngineResult<HashMap<String, Trajectory>> {
        if trace_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let tenants = self.tenant_resolver.tenants_for(platform).await?;

        let settings = Settings {
            workspace_id: workspace_id.to_string(),
            platform: platform.clone(),
            query_start: Some(start_at),
            query_end: Some(end_at),
        };

        // Full descendant set for tree linkage and root detection
        let all_filter = FilterExpression::and(vec![FilterField::in_list(
            FIELD_TRACE_ID,
            trace_ids.to_vec(),
        )]);
        let mut all = self
            .list_spans_paged(workspace_id, &tenants, all_filter, start_at, end_at)
            .await?;
        all = self.pipelines.build_get_trace(&settings)?.run(all)?;
        normalize_legacy_span_types(&mut all);
        tracing::debug!(count = all.len(), "Fetched descendant spans for trajectories");

        let rule = self.effective_rule(workspace_id).await?;
        let explicit_ids = self.next_level_span_ids(&all);
        let select_filter = build_select_filter(trace_ids, &rule, &explicit_ids);

        let mut selected = self
            .list_spans_paged(workspace_id, &tenants, select_filter, start_at, end_at)
            .await?;
        normalize_legacy_span_types(&mut selected);
        tracing::debug!(count = selected.len(), "Fetched selected spans for trajectories");

        Ok(build_trajectories(
            &all,
            &selected,
            &self.config.fallback_root_names,
        ))
    }

    /// The configured rule, or the built-in by-span-type default.
    async fn effective_rule(&self, workspace_id: &str) -> EngineResult<FilterExpression> {
        match self.config_store.get_trajectory_config(workspace_id).await? {
            Some(filter) if !filter.is_empty() => Ok(filter),
            _ => Ok(FilterExpression::and(vec![FilterField::in_list(
                FIELD_SPAN_TYPE,
                self.config.default_trajectory_span_types.clone(),
            )])),
        }
    }

    /// Span ids one level below a fallback-root-marker span.
    ///
    /// These are force-included in the selection so the marker's direct
    /// children survive even when they don't match the trajectory rule.
    fn next_level_span_ids(&self, all: &[Span]) -> Vec<String> {
        let Some(marker) = all
            .iter()
            .find(|s| self.config.fallback_root_names.iter().any(|n| *n == s.span_name))
        else {
            return Vec::new();
        };
        all.iter()
            .filter(|s| s.parent_id == marker.span_id)
            .map(|s| s.span_id.clone())
            .collect()
    }

    async fn list_spans_paged(
        &self,
        workspace_id: &str,
        tenants: &[String],
        filters: FilterExpression,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> EngineResult<Vec<Span>> {
        let mut spans = Vec::new();
        let mut page_token = None;
        loop {
            let result = self
                .span_store
                .list_spans(&ListSpansParams {
                    workspace_id: workspace_id.to_string(),
                    tenants: tenants.to_vec(),
                    filters: Some(filters.clone()),
                    start_at: Some(start_at),
                    end_at: Some(end_at),
                    limit: TRAJECTORY_SPAN_FETCH_LIMIT,
                    page_token,
                })
                .await?;
            spans.extend(result.spans);
            match result.page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(spans)
    }
}

/// Selection query: `(trace-ids AND rule) OR (trace-ids AND explicit ids)`.
///
/// Rule-matching nodes are pulled in even when not explicitly selected, and
/// explicitly selected nodes are never dropped by the rule.
fn build_select_filter(
    trace_ids: &[String],
    rule: &FilterExpression,
    explicit_ids: &[String],
) -> FilterExpression {
    let mut branches = vec![FilterField::sub(FilterExpression::and(vec![
        FilterField::in_list(FIELD_TRACE_ID, trace_ids.to_vec()),
        FilterField::sub(rule.clone()),
    ]))];
    if !explicit_ids.is_empty() {
        branches.push(FilterField::sub(FilterExpression::and(vec![
            FilterField::in_list(FIELD_TRACE_ID, trace_ids.to_vec()),
            FilterField::in_list(FIELD_SPAN_ID, explicit_ids.to_vec()),
        ])));
    }
    FilterExpression::or(branches)
}

/// Reclassify legacy span-type aliases into their canonical categories.
fn normalize_legacy_span_types(spans: &mut [Span]) {
    for span in spans {
        if span.span_type == SPAN_TYPE_GRAPH {
            span.span_type = SPAN_TYPE_AGENT.to_string();
        }
    }
}

/// Group both span sets by trace and reconstruct each trajectory.
fn build_trajectories(
    all: &[Span],
    selected: &[Span],
    fallback_root_names: &[String],
) -> HashMap<String, Trajectory> {
    let mut all_by_trace: HashMap<&str, Vec<&Span>> = HashMap::new();
    for span in all {
        all_by_trace.entry(&span.trace_id).or_default().push(span);
    }
    let mut selected_by_trace: HashMap<&str, Vec<&Span>> = HashMap::new();
    for span in selected {
        selected_by_trace
            .entry(&span.trace_id)
            .or_default()
            .push(span);
    }

    let mut trajectories = HashMap::new();
    for (trace_id, trace_spans) in all_by_trace {
        let selection = selected_by_trace.remove(trace_id).unwrap_or_default();
        trajectories.insert(
            trace_id.to_string(),
            build_trajectory(trace_id, &trace_spans, &selection, fallback_root_names),
        );
    }
    trajectories
}
