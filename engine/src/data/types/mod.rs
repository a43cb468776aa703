//! Engine data model
//!
//! Spans and annotations mirror what the span store holds; datasets mirror
//! what the destination providers expect; trajectories and filters are
//! engine-derived.

mod annotation;
mod dataset;
mod filter;
mod span;
mod trajectory;

pub use annotation::{Annotation, AnnotationType, DeferredAnnotation};
pub use dataset::{
    Content, ContentType, Dataset, DatasetCategory, DatasetItem, DatasetSchema, FieldData,
    FieldMapping, FieldSchema, Image, ItemError, ItemErrorDetail, ItemErrorGroup, ItemErrorKind,
    ItemSource, TRAJECTORY_FIELD_KEY, content_info, merge_error_groups,
};
pub use filter::{FieldType, FilterExpression, FilterField, LogicalOp, QueryOp};
pub use span::{PlatformType, Span};
pub use trajectory::{AgentStep, RootStep, Trajectory, build_trajectory};
