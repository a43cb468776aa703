//! Domain services
//!
//! - `processing` - per-call-site span filter pipelines
//! - `trajectory` - trajectory reconstruction from stored traces
//! - `chain` - response-chain resolution across spans
//! - `export` - dataset export materialization and annotation backfill

pub mod chain;
pub mod export;
pub mod processing;
pub mod trajectory;

pub use chain::{ChainService, PreSpanRequest};
pub use export::{
    ExportRequest, ExportResult, ExportService, ExportTarget, ExportType, PreviewResult, SpanRef,
};
pub use processing::PipelineBuilder;
pub use trajectory::TrajectoryService;
