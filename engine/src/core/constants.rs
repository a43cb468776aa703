// =============================================================================
// Span Fields & Tags
// =============================================================================

/// Span field name for trace id filters
pub const FIELD_TRACE_ID: &str = "trace_id";

/// Span field name for span id filters
pub const FIELD_SPAN_ID: &str = "span_id";

/// Span field name for span type filters
pub const FIELD_SPAN_TYPE: &str = "span_type";

/// Tag carrying the response id a span produced
pub const TAG_RESPONSE_ID: &str = "response_id";

/// Tag carrying the response id a span continues from
pub const TAG_PREVIOUS_RESPONSE_ID: &str = "previous_response_id";

// =============================================================================
// Span Types
// =============================================================================

pub const SPAN_TYPE_AGENT: &str = "agent";
pub const SPAN_TYPE_MODEL: &str = "model";
pub const SPAN_TYPE_TOOL: &str = "tool";

/// Legacy alias normalized to `agent`
pub const SPAN_TYPE_GRAPH: &str = "graph";

// =============================================================================
// Trajectory Reconstruction
// =============================================================================

/// Parent id value that marks a root span
pub const PARENT_ID_ROOT_SENTINEL: &str = "0";

/// Default fallback root marker: a span with this name is treated as the
/// trace entry point when no sentinel-rooted span exists
pub const DEFAULT_FALLBACK_ROOT_NAME: &str = "EvalTarget";

/// Default span types included by the built-in trajectory rule
pub const DEFAULT_TRAJECTORY_SPAN_TYPES: &[&str] = &[SPAN_TYPE_AGENT];

/// Spans fetched per store round-trip while gathering trace descendants
pub const TRAJECTORY_SPAN_FETCH_LIMIT: u32 = 1000;

// =============================================================================
// Field Clipping
// =============================================================================

/// Maximum byte length of a span text field before clipping
pub const CLIP_MAX_BYTES: usize = 10 * 1024;

/// Marker appended to clipped text
pub const CLIP_SUFFIX: &str = "...";

// =============================================================================
// Response-Chain Resolution
// =============================================================================

/// Span ids fetched per store round-trip when materializing a chain
pub const PRE_SPAN_FETCH_PAGE_SIZE: usize = 100;

// =============================================================================
// Export Error Aggregation
// =============================================================================

/// Detail entries kept per error group for interactive export/preview calls
pub const ERROR_DETAIL_CAP_INTERACTIVE: usize = 5;

/// Detail entries kept per error group for bulk import jobs
pub const ERROR_DETAIL_CAP_IMPORT_JOB: usize = 10;

// =============================================================================
// Defaults
// =============================================================================

/// Default retention window for trace queries, in days
pub const DEFAULT_MAX_TRACE_AGE_DAYS: i64 = 7;

/// Default retry budget for deferred annotation writes
pub const DEFAULT_ANNOTATION_MAX_RETRIES: u32 = 3;

/// Default buffer size of the deferred-annotation channel
pub const DEFAULT_ANNOTATION_QUEUE_CAPACITY: usize = 1024;
