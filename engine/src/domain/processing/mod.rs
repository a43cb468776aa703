//! Span filter pipeline
//!
//! Ordered, pluggable stages applied to a span batch before it is returned
//! or materialized. Each call-site (ingest, get-trace, list-spans, export,
//! search) owns its own ordered stage list; a [`Pipeline`] is built per
//! request from those factories and applied as an ordered reduction.
//!
//! Stages are pure: they consume a batch and return a new one, and a stage
//! failure fails the whole pipeline with no partial output.

mod check;
mod clip;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::data::types::{PlatformType, Span};
use crate::error::EngineResult;

pub use check::{ConsistencyCheckFactory, ConsistencyCheckProcessor};
pub use clip::{ClipFactory, ClipProcessor};

/// Per-request context a factory may specialize its stage on.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub workspace_id: String,
    pub platform: PlatformType,
    pub query_start: Option<DateTime<Utc>>,
    pub query_end: Option<DateTime<Utc>>,
}

/// One pipeline stage.
pub trait SpanProcessor: Send + Sync {
    fn transform(&self, spans: Vec<Span>) -> EngineResult<Vec<Span>>;
}

/// Builds one stage for a request.
pub trait ProcessorFactory: Send + Sync {
    fn create(&self, settings: &Settings) -> EngineResult<Box<dyn SpanProcessor>>;
}

/// An ordered stage sequence built for one request.
pub struct Pipeline {
    stages: Vec<Box<dyn SpanProcessor>>,
}

impl Pipeline {
    pub fn run(&self, mut spans: Vec<Span>) -> EngineResult<Vec<Span>> {
        for stage in &self.stages {
            spans = stage.transform(spans)?;
        }
        Ok(spans)
    }
}

/// Per-call-site stage configuration.
///
/// Constructed once at wiring time; each build method assembles the ordered
/// pipeline for one call-site from its factory list.
#[derive(Default)]
pub struct PipelineBuilder {
    ingest: Vec<Arc<dyn ProcessorFactory>>,
    get_trace: Vec<Arc<dyn ProcessorFactory>>,
    list_spans: Vec<Arc<dyn ProcessorFactory>>,
    export: Vec<Arc<dyn ProcessorFactory>>,
    search: Vec<Arc<dyn ProcessorFactory>>,
}

impl PipelineBuilder {
    pub fn new(
        ingest: Vec<Arc<dyn ProcessorFactory>>,
        get_trace: Vec<Arc<dyn ProcessorFactory>>,
        list_spans: Vec<Arc<dyn ProcessorFactory>>,
        export: Vec<Arc<dyn ProcessorFactory>>,
        search: Vec<Arc<dyn ProcessorFactory>>,
    ) -> Self {
        Self {
            ingest,
            get_trace,
            list_spans,
            export,
            search,
        }
    }

    /// The stock wiring: clipping everywhere spans leave the engine, with
    /// batch consistency checks on trace-shaped reads and exports.
    pub fn standard() -> Self {
        let clip: Arc<dyn ProcessorFactory> = Arc::new(ClipFactory);
        let check: Arc<dyn ProcessorFactory> = Arc::new(ConsistencyCheckFactory);
        Self::new(
            vec![],
            vec![clip.clone(), check.clone()],
            vec![clip.clone()],
            vec![clip.clone(), check],
            vec![clip],
        )
    }

    pub fn build_ingest(&self, settings: &Settings) -> EngineResult<Pipeline> {
        Self::build(&self.ingest, settings)
    }

    pub fn build_get_trace(&self, settings: &Settings) -> EngineResult<Pipeline> {
        Self::build(&self.get_trace, settings)
    }

    pub fn build_list_spans(&self, settings: &Settings) -> EngineResult<Pipeline> {
        Self::build(&self.list_spans, settings)
    }

    pub fn build_export(&self, settings: &Settings) -> EngineResult<Pipeline> {
        Self::build(&self.export, settings)
    }

    pub fn build_search(&self, settings: &Settings) -> EngineResult<Pipeline> {
        Self::build(&self.search, settings)
    }

    fn build(factories: &[Arc<dyn ProcessorFactory>], settings: &Settings) -> EngineResult<Pipeline> {
        let mut stages = Vec::with_capacity(factories.len());
        for factory in factories {
            stages.push(factory.create(settings)?);
        }
        Ok(Pipeline { stages })
    }
}
