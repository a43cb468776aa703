//! Trace reconstruction and dataset export engine
//!
//! Re-materializes stored LLM-observability traces: raw spans are queried
//! back out of a span store, filtered through per-call-site pipelines,
//! reassembled into execution trajectories, and exported as items into
//! versioned datasets for offline evaluation and labeling. Storage, dataset
//! destinations, tenant routing, and the retry queue are injected behind the
//! traits in [`data::traits`].

pub mod core;
pub mod data;
pub mod domain;
pub mod error;
pub mod utils;

pub use crate::core::EngineConfig;
pub use domain::{ChainService, ExportService, PipelineBuilder, TrajectoryService};
pub use error::{EngineError, EngineResult};
