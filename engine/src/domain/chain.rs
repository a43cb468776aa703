//! Response-chain resolution
//!
//! A span may point at a predecessor through its `previous_response_id` tag,
//! forming a linked list of conversational turns spread across otherwise
//! unrelated spans. The store's linkage index walks the pointers and hands
//! back ordered ids; this service fetches the bodies, restores chain order,
//! and gates visibility across workspaces.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::core::constants::{FIELD_SPAN_ID, FIELD_TRACE_ID, PRE_SPAN_FETCH_PAGE_SIZE};
use crate::data::traits::{
    GetPreSpanIdsParams, ListSpansParams, SpanStore, TenantResolver,
};
use crate::data::types::{FilterExpression, FilterField, PlatformType, Span};
use crate::domain::processing::{PipelineBuilder, Settings};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
pub struct PreSpanRequest {
    pub workspace_id: String,
    pub platform: PlatformType,
    pub trace_id: String,
    pub span_id: String,
    /// Caller-asserted `previous_response_id` of the starting span
    pub previous_response_id: String,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

pub struct ChainService {
    span_store: Arc<dyn SpanStore>,
    tenant_resolver: Arc<dyn TenantResolver>,
    pipelines: Arc<PipelineBuilder>,
}

impl ChainService {
    pub fn new(
        span_store: Arc<dyn SpanStore>,
        tenant_resolver: Arc<dyn TenantResolver>,
        pipelines: Arc<PipelineBuilder>,
    ) -> Self {
        Self {
            span_store,
            tenant_resolver,
            pipelines,
        }
    }

    /// Resolve the predecessor chain for the request's starting span,
    /// ordered to match the linkage index's response-id order.
    pub async fn list_pre_spans(&self, req: &PreSpanRequest) -> EngineResult<Vec<Span>> {
        let tenants = self.tenant_resolver.tenants_for(&req.platform).await?;

        let (mut span_ids, response_ids) = self
            .span_store
            .get_pre_span_ids(&GetPreSpanIdsParams {
                workspace_id: req.workspace_id.clone(),
                tenants: tenants.clone(),
                trace_id: req.trace_id.clone(),
                span_id: req.span_id.clone(),
                previous_response_id: req.previous_response_id.clone(),
                start_at: req.start_at,
            })
            .await?;
        if span_ids.is_empty() {
            return Ok(Vec::new());
        }
        // The authorization check needs the starting span's body regardless of
        // whether the index reported it as part of the chain.
        if !span_ids.iter().any(|id| *id == req.span_id) {
            span_ids.push(req.span_id.clone());
        }

        let batch = self.fetch_span_bodies(req, &tenants, &span_ids).await?;
        self.check_pre_span_auth(req, &tenants, &batch).await?;

        let ordered = reorder_by_response_ids(batch, &response_ids);

        let settings = Settings {
            workspace_id: req.workspace_id.clone(),
            platform: req.platform.clone(),
            query_start: req.start_at,
            query_end: req.end_at,
        };
        self.pipelines.build_list_spans(&settings)?.run(ordered)
    }

    /// Fetch full bodies for the chain ids in fixed-size pages.
    async fn fetch_span_bodies(
        &self,
        req: &PreSpanRequest,
        tenants: &[String],
        span_ids: &[String],
    ) -> EngineResult<Vec<Span>> {
        let mut batch = Vec::with_capacity(span_ids.len());
        for page in span_ids.chunks(PRE_SPAN_FETCH_PAGE_SIZE) {
            let result = self
                .span_store
                .list_spans(&ListSpansParams {
                    workspace_id: req.workspace_id.clone(),
                    tenants: tenants.to_vec(),
                    filters: Some(FilterExpression::and(vec![FilterField::in_list(
                        FIELD_SPAN_ID,
                        page.to_vec(),
                    )])),
                    start_at: req.start_at,
                    end_at: req.end_at,
                    limit: page.len() as u32,
                    page_token: None,
                })
                .await?;
            batch.extend(result.spans);
        }
        Ok(batch)
    }

    /// Fail-closed visibility check over the fetched batch.
    ///
    /// The starting span must be present and its `previous_response_id` tag
    /// must match the caller's asserted value. A cross-workspace starting
    /// span is allowed only when the caller's workspace can see at least one
    /// span of the requested trace.
    async fn check_pre_span_auth(
        &self,
        req: &PreSpanRequest,
        tenants: &[String],
        batch: &[Span],
    ) -> EngineResult<()> {
        let Some(current) = batch.iter().find(|s| s.span_id == req.span_id) else {
            return Err(EngineError::AuthorizationDenied(format!(
                "span '{}' not found in response chain",
                req.span_id
            )));
        };
        if current.previous_response_id().unwrap_or("") != req.previous_response_id {
            return Err(EngineError::AuthorizationDenied(format!(
                "previous_response_id mismatch for span '{}'",
                req.span_id
            )));
        }
        if current.workspace_id == req.workspace_id {
            return Ok(());
        }
        let visible = self
            .span_store
            .list_spans(&ListSpansParams {
                workspace_id: req.workspace_id.clone(),
                tenants: tenants.to_vec(),
                filters: Some(FilterExpression::and(vec![FilterField::in_list(
                    FIELD_TRACE_ID,
                    vec![req.trace_id.clone()],
                )])),
                start_at: req.start_at,
                end_at: req.end_at,
                limit: 1,
                page_token: None,
            })
            .await?;
        if visible.spans.is_empty() {
            return Err(EngineError::AuthorizationDenied(format!(
                "trace '{}' not visible in workspace '{}'",
                req.trace_id, req.workspace_id
            )));
        }
        Ok(())
    }
}

/// Restore chain order: fetch order never matches the linkage index's order,
/// so spans are ranked by where their `response_id` tag sits in the index's
/// response-id list. Spans with no rank are not chain members (the starting
/// span is fetched only for the authorization check) and are dropped.
fn reorder_by_response_ids(batch: Vec<Span>, response_ids: &[String]) -> Vec<Span> {
    let rank: HashMap<&str, usize> = response_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut ranked: Vec<(usize, Span)> = batch
        .into_iter()
        .filter_map(|span| {
            let rank = span.response_id().and_then(|id| rank.get(id).copied())?;
            Some((rank, span))
        })
        .collect();
    ranked.sort_by_key(|(rank, _)| *rank);
    ranked.into_iter().map(|(_, span)| span).collect()
}
