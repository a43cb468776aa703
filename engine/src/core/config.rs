//! Engine configuration
//!
//! Everything the engine needs beyond its injected collaborators lives here:
//! retention windows, the built-in trajectory rule, root-detection markers,
//! and the annotation retry budget. All fields have serde defaults so a
//! partially-specified config file deserializes cleanly.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::constants::{
    DEFAULT_ANNOTATION_MAX_RETRIES, DEFAULT_ANNOTATION_QUEUE_CAPACITY,
    DEFAULT_FALLBACK_ROOT_NAME, DEFAULT_MAX_TRACE_AGE_DAYS, DEFAULT_TRAJECTORY_SPAN_TYPES,
};
use crate::data::types::PlatformType;

/// Engine-wide configuration, injected into the services at construction.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// How far back trace queries may reach, in days
    #[serde(default = "default_max_trace_age_days")]
    pub max_trace_age_days: i64,

    /// Per-platform overrides of `max_trace_age_days`
    #[serde(default)]
    pub platform_max_trace_age_days: HashMap<String, i64>,

    /// Span types selected by the built-in trajectory rule when a workspace
    /// has no configured rule
    #[serde(default = "default_trajectory_span_types")]
    pub default_trajectory_span_types: Vec<String>,

    /// Span names treated as the trace entry point when no sentinel-rooted
    /// span exists
    #[serde(default = "default_fallback_root_names")]
    pub fallback_root_names: Vec<String>,

    /// Retry budget carried on deferred annotation writes
    #[serde(default = "default_annotation_max_retries")]
    pub annotation_max_retries: u32,

    /// Buffer size of the deferred-annotation channel
    #[serde(default = "default_annotation_queue_capacity")]
    pub annotation_queue_capacity: usize,
}

fn default_max_trace_age_days() -> i64 {
    DEFAULT_MAX_TRACE_AGE_DAYS
}

fn default_trajectory_span_types() -> Vec<String> {
    DEFAULT_TRAJECTORY_SPAN_TYPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_fallback_root_names() -> Vec<String> {
    vec![DEFAULT_FALLBACK_ROOT_NAME.to_string()]
}

fn default_annotation_max_retries() -> u32 {
    DEFAULT_ANNOTATION_MAX_RETRIES
}

fn default_annotation_queue_capacity() -> usize {
    DEFAULT_ANNOTATION_QUEUE_CAPACITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_trace_age_days: default_max_trace_age_days(),
            platform_max_trace_age_days: HashMap::new(),
            default_trajectory_span_types: default_trajectory_span_types(),
            fallback_root_names: default_fallback_root_names(),
            annotation_max_retries: default_annotation_max_retries(),
            annotation_queue_capacity: default_annotation_queue_capacity(),
        }
    }
}

impl EngineConfig {
    /// Parse a config from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse engine config")
    }

    /// Retention window in days for the given platform.
    pub fn max_trace_age_days_for(&self, platform: &PlatformType) -> i64 {
        self.platform_max_trace_age_days
            .get(platform.as_str())
            .copied()
            .unwrap_or(self.max_trace_age_days)
    }
}
