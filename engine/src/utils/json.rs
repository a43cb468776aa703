//! JSON path helpers
//!
//! Field-mapping extraction rules use a small jsonpath dialect: an optional
//! `$` root, dot-separated object keys, and `[n]` array indexes (for example
//! `$.messages[0].content`). Nothing in the rules needs wildcards or
//! filters, so lookups stay a plain walk over `serde_json::Value`.

use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JsonLookupError {
    #[error("Content is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),

    #[error("Invalid json path segment: {0}")]
    BadPath(String),
}

/// Walk `path` into `root`. Returns `None` when any segment is missing.
pub fn lookup_path<'a>(
    root: &'a JsonValue,
    path: &str,
) -> Result<Option<&'a JsonValue>, JsonLookupError> {
    let mut current = root;
    for segment in parse_path(path)? {
        let next = match segment {
            PathSegment::Key(key) => current.get(key),
            PathSegment::Index(idx) => current.get(idx),
        };
        match next {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Parse JSON content and walk `path`, rendering the result as text.
///
/// String leaves are returned unquoted; other values are re-serialized, and
/// a missing path yields an empty string.
pub fn extract_path_text(content: &str, path: &str) -> Result<String, JsonLookupError> {
    let root: JsonValue = serde_json::from_str(content)?;
    match lookup_path(&root, path)? {
        Some(v) => Ok(value_to_string(v)),
        None => Ok(String::new()),
    }
}

/// Render a JSON value as the text an exported field should carry.
pub fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

enum PathSegment<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<PathSegment<'_>>, JsonLookupError> {
    let trimmed = path.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let trimmed = trimmed.strip_prefix('.').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    for part in trimmed.split('.') {
        if part.is_empty() {
            return Err(JsonLookupError::BadPath(path.to_string()));
        }
        // Each dot-part may carry trailing [n] indexes: key[0][1]
        let mut rest = part;
        if let Some(bracket) = rest.find('[') {
            let (key, indexes) = rest.split_at(bracket);
            if !key.is_empty() {
                segments.push(PathSegment::Key(key));
            }
            rest = indexes;
            while let Some(inner) = rest.strip_prefix('[') {
                let Some(end) = inner.find(']') else {
                    return Err(JsonLookupError::BadPath(path.to_string()));
                };
                let idx: usize = inner[..end]
                    .parse()
                    .map_err(|_| JsonLookupError::BadPath(path.to_string()))?;
                segments.push(PathSegment::Index(idx));
                rest = &inner[end + 1..];
            }
            if !rest.is_empty() {
                return Err(JsonLookupError::BadPath(path.to_string()));
            }
        } else {
            segments.push(PathSegment::Key(rest));
        }
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_path_returns_whole_document() {
        let doc = json!({"a": 1});
        let found = lookup_path(&doc, "$").unwrap().unwrap();
        assert_eq!(found, &doc);
    }

    #[test]
    fn test_nested_key_and_index() {
        let doc = json!({"messages": [{"content": "hi"}, {"content": "there"}]});
        let found = lookup_path(&doc, "$.messages[1].content").unwrap().unwrap();
        assert_eq!(found, &json!("there"));
    }

    #[test]
    fn test_missing_key_is_none() {
        let doc = json!({"a": 1});
        assert!(lookup_path(&doc, "$.b").unwrap().is_none());
    }

    #[test]
    fn test_bad_path_is_error() {
        let doc = json!({"a": 1});
        assert!(lookup_path(&doc, "$.a[x]").is_err());
        assert!(lookup_path(&doc, "$.a[0").is_err());
    }

    #[test]
    fn test_extract_path_text_string_unquoted() {
        let content = r#"{"a": {"b": "hello"}}"#;
        assert_eq!(extract_path_text(content, "$.a.b").unwrap(), "hello");
    }

    #[test]
    fn test_extract_path_text_object_serialized() {
        let content = r#"{"a": {"b": 1}}"#;
        assert_eq!(extract_path_text(content, "$.a").unwrap(), r#"{"b":1}"#);
    }

    #[test]
    fn test_extract_path_text_missing_is_empty() {
        let content = r#"{"a": 1}"#;
        assert_eq!(extract_path_text(content, "$.z").unwrap(), "");
    }

    #[test]
    fn test_extract_path_text_non_json_is_error() {
        assert!(extract_path_text("plain text", "$.a").is_err());
    }
}
