//! Span records as read back from the span store
//!
//! Spans are owned by the store and read-only to the engine, except for the
//! annotations the export backfill appends.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::constants::{TAG_PREVIOUS_RESPONSE_ID, TAG_RESPONSE_ID};
use crate::data::types::Annotation;
use crate::utils::json::{JsonLookupError, extract_path_text};

/// Storage platform a query targets. Open-ended: the tenant resolver maps it
/// to concrete storage tenants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PlatformType(String);

impl PlatformType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PlatformType {
    fn default() -> Self {
        Self("native".to_string())
    }
}

impl std::fmt::Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recorded unit of execution within a trace.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Span {
    pub trace_id: String,
    pub span_id: String,
    /// Parent span id; `"0"` or empty marks a root span
    pub parent_id: String,
    pub workspace_id: String,
    pub span_type: String,
    pub span_name: String,
    /// Raw text or serialized JSON
    pub input: String,
    /// Raw text or serialized JSON
    pub output: String,
    pub start_time: DateTime<Utc>,
    pub duration_ms: i64,
    /// Non-zero indicates an errored span
    pub status_code: i32,
    /// String-keyed tags; carries `response_id` / `previous_response_id`
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl Span {
    /// `true` when the parent pointer is the root sentinel.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_empty() || self.parent_id == crate::core::constants::PARENT_ID_ROOT_SENTINEL
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn response_id(&self) -> Option<&str> {
        self.tag(TAG_RESPONSE_ID)
    }

    pub fn previous_response_id(&self) -> Option<&str> {
        self.tag(TAG_PREVIOUS_RESPONSE_ID)
    }

    /// Raw text of a named span field. Unknown names fall through to tags.
    pub fn field_text(&self, field: &str) -> Option<&str> {
        match field {
            "trace_id" => Some(&self.trace_id),
            "span_id" => Some(&self.span_id),
            "parent_id" => Some(&self.parent_id),
            "span_name" => Some(&self.span_name),
            "span_type" => Some(&self.span_type),
            "input" => Some(&self.input),
            "output" => Some(&self.output),
            _ => self.tag(field),
        }
    }

    /// Evaluate a (field, jsonpath) extraction rule against this span.
    ///
    /// An empty path returns the raw field text. A missing field resolves to
    /// an empty value; non-JSON content under a non-empty path surfaces as
    /// [`JsonLookupError`] for the caller to tolerate.
    pub fn extract_by_jsonpath(&self, field: &str, path: &str) -> Result<String, JsonLookupError> {
        let raw = self.field_text(field).unwrap_or("");
        if path.trim().is_empty() || path.trim() == "$" {
            return Ok(raw.to_string());
        }
        extract_path_text(raw, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_with_input(input: &str) -> Span {
        Span {
            trace_id: "t1".to_string(),
            span_id: "s1".to_string(),
            input: input.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_is_root() {
        let mut span = span_with_input("");
        span.parent_id = "0".to_string();
        assert!(span.is_root());
        span.parent_id = String::new();
        assert!(span.is_root());
        span.parent_id = "parent".to_string();
        assert!(!span.is_root());
    }

    #[test]
    fn test_chain_tags() {
        let mut span = span_with_input("");
        span.tags
            .insert("response_id".to_string(), "r1".to_string());
        span.tags
            .insert("previous_response_id".to_string(), "r0".to_string());
        assert_eq!(span.response_id(), Some("r1"));
        assert_eq!(span.previous_response_id(), Some("r0"));
    }

    #[test]
    fn test_extract_empty_path_returns_raw() {
        let span = span_with_input("plain text");
        assert_eq!(span.extract_by_jsonpath("input", "").unwrap(), "plain text");
        assert_eq!(span.extract_by_jsonpath("input", "$").unwrap(), "plain text");
    }

    #[test]
    fn test_extract_json_path() {
        let span = span_with_input(r#"{"messages": [{"role": "user", "content": "hi"}]}"#);
        assert_eq!(
            span.extract_by_jsonpath("input", "$.messages[0].content")
                .unwrap(),
            "hi"
        );
    }

    #[test]
    fn test_extract_non_json_with_path_is_error() {
        let span = span_with_input("not json");
        assert!(span.extract_by_jsonpath("input", "$.a").is_err());
    }

    #[test]
    fn test_field_text_falls_back_to_tags() {
        let mut span = span_with_input("");
        span.tags.insert("model".to_string(), "gpt-x".to_string());
        assert_eq!(span.field_text("model"), Some("gpt-x"));
        assert_eq!(span.field_text("missing"), None);
    }
}
