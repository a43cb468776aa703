//! Data layer: domain types, collaborator traits, and their errors

pub mod error;
pub mod traits;
pub mod types;

pub use error::DataError;
pub use traits::{
    AnnotationQueue, DatasetProvider, DatasetProviderRegistry, GetPreSpanIdsParams,
    GetTraceParams, InsertAnnotationParams, ListSpansParams, ListSpansResult, SpanStore,
    TenantResolver, TrajectoryConfigStore,
};
