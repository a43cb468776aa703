//! Trajectories: a derived, filtered view of one trace
//!
//! A trajectory is never persisted by the engine; it is rebuilt per request
//! from the trace's span tree and a selection subset, then serialized into
//! dataset fields on demand.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::data::types::Span;
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Trajectory {
    /// Trace id this trajectory was derived from
    pub id: String,
    /// Entry span of the trace; `None` when no root-shaped node exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_step: Option<RootStep>,
    /// Canonical projections of the selected tree nodes, in discovery order
    pub agent_steps: Vec<AgentStep>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RootStep {
    pub id: String,
    pub name: String,
    pub span_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentStep {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub span_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Trajectory {
    pub fn to_json_string(&self) -> EngineResult<String> {
        serde_json::to_string(self)
            .map_err(|e| EngineError::Internal(format!("trajectory serialization failed: {e}")))
    }
}

fn opt_text(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Reconstruct one trace's trajectory from its full span set and a selected
/// subset.
///
/// Root detection: a sentinel-rooted span (`parent_id == "0"` or empty)
/// wins; otherwise the first span whose name matches one of
/// `fallback_root_names`. Selected spans whose parent chain dangles or
/// cycles without reaching the root are dropped as orphans; traversal is
/// bounded by a visited-set so cycles never loop.
pub fn build_trajectory(
    trace_id: &str,
    all: &[&Span],
    selected: &[&Span],
    fallback_root_names: &[String],
) -> Trajectory {
    let span_map: HashMap<&str, &Span> = all.iter().map(|s| (s.span_id.as_str(), *s)).collect();

    let root = all
        .iter()
        .find(|s| s.is_root())
        .or_else(|| {
            all.iter()
                .find(|s| fallback_root_names.iter().any(|n| *n == s.span_name))
        })
        .copied();

    let root_step = root.map(|span| RootStep {
        id: span.span_id.clone(),
        name: span.span_name.clone(),
        span_type: span.span_type.clone(),
        input: opt_text(&span.input),
        output: opt_text(&span.output),
    });

    let agent_steps = selected
        .iter()
        .filter(|span| is_rooted(span, root, &span_map))
        .map(|span| AgentStep {
            id: span.span_id.clone(),
            parent_id: span.parent_id.clone(),
            name: span.span_name.clone(),
            span_type: span.span_type.clone(),
            input: opt_text(&span.input),
            output: opt_text(&span.output),
        })
        .collect();

    Trajectory {
        id: trace_id.to_string(),
        root_step,
        agent_steps,
    }
}

/// Whether `span`'s ancestor chain reaches the trace root.
///
/// With no detected root, only the immediate parent reference is checked, so
/// orphans are still excluded.
fn is_rooted(span: &Span, root: Option<&Span>, span_map: &HashMap<&str, &Span>) -> bool {
    let Some(root) = root else {
        return span.is_root() || span_map.contains_key(span.parent_id.as_str());
    };

    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = span;
    loop {
        if current.span_id == root.span_id || current.is_root() {
            return true;
        }
        if !visited.insert(current.span_id.as_str()) {
            // Cycle: never reaches the root
            return false;
        }
        match span_map.get(current.parent_id.as_str()) {
            Some(parent) => current = parent,
            // Dangling parent reference: orphan
            None => return false,
        }
    }
}
