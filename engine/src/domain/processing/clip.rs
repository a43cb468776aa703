//! Clip stage: bounds span text fields
//!
//! Input and output payloads longer than [`CLIP_MAX_BYTES`] are shortened.
//! JSON payloads are clipped structurally: only string leaves over the
//! bound are truncated, so short sibling fields survive byte-identical and
//! the document stays valid JSON. Anything else (or a JSON document the
//! structural pass leaves unchanged) is truncated as plain text.

use serde_json::Value as JsonValue;

use super::{ProcessorFactory, Settings, SpanProcessor};
use crate::core::constants::{CLIP_MAX_BYTES, CLIP_SUFFIX};
use crate::data::types::Span;
use crate::error::EngineResult;

pub struct ClipProcessor;

impl SpanProcessor for ClipProcessor {
    fn transform(&self, mut spans: Vec<Span>) -> EngineResult<Vec<Span>> {
        for span in &mut spans {
            if span.input.len() > CLIP_MAX_BYTES {
                span.input = clip_span_field(&span.input);
            }
            if span.output.len() > CLIP_MAX_BYTES {
                span.output = clip_span_field(&span.output);
            }
        }
        Ok(spans)
    }
}

pub struct ClipFactory;

impl ProcessorFactory for ClipFactory {
    fn create(&self, _settings: &Settings) -> EngineResult<Box<dyn SpanProcessor>> {
        Ok(Box::new(ClipProcessor))
    }
}

/// Clip one field: structural JSON clipping first, plain text as fallback.
pub(crate) fn clip_span_field(content: &str) -> String {
    if content.len() <= CLIP_MAX_BYTES {
        return content.to_string();
    }
    match clip_json_content(content) {
        Some(clipped) => clipped,
        None => clip_plain_text(content),
    }
}

/// Structurally clip a JSON document. Returns `None` when the content is not
/// JSON, nothing changed, or re-serialization fails.
fn clip_json_content(content: &str) -> Option<String> {
    let mut value: JsonValue = serde_json::from_str(content).ok()?;
    if !clip_json_value(&mut value) {
        return None;
    }
    serde_json::to_string(&value).ok()
}

/// Clip string leaves in place; returns whether anything changed.
fn clip_json_value(value: &mut JsonValue) -> bool {
    match value {
        JsonValue::String(s) => {
            if s.len() > CLIP_MAX_BYTES {
                *s = clip_plain_text(s);
                true
            } else {
                false
            }
        }
        JsonValue::Array(items) => {
            let mut changed = false;
            for item in items {
                changed |= clip_json_value(item);
            }
            changed
        }
        JsonValue::Object(map) => {
            let mut changed = false;
            for (_, item) in map.iter_mut() {
                changed |= clip_json_value(item);
            }
            changed
        }
        _ => false,
    }
}

/// Truncate to the clip bound on a UTF-8 boundary and append the marker.
pub(crate) fn clip_plain_text(content: &str) -> String {
    if content.len() <= CLIP_MAX_BYTES {
        return content.to_string();
    }
    let mut clipped = clip_by_byte_limit(content, CLIP_MAX_BYTES).to_string();
    clipped.push_str(CLIP_SUFFIX);
    clipped
}

/// Longest prefix of `content` within `limit` bytes that ends on a char
/// boundary.
fn clip_by_byte_limit(content: &str, limit: usize) -> &str {
    if limit >= content.len() {
        return content;
    }
    let mut end = limit;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_with_input(input: String) -> Span {
        Span {
            input,
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_text_clipped_to_exact_length() {
        let content = "a".repeat(CLIP_MAX_BYTES + 5);
        let spans = ClipProcessor
            .transform(vec![span_with_input(content)])
            .unwrap();
        assert_eq!(spans[0].input.len(), CLIP_MAX_BYTES + CLIP_SUFFIX.len());
        assert!(spans[0].input.ends_with(CLIP_SUFFIX));
    }

    #[test]
    fn test_output_field_clipped_too() {
        let content = "f".repeat(CLIP_MAX_BYTES + 50);
        let spans = ClipProcessor
            .transform(vec![Span {
                output: content,
                ..Default::default()
            }])
            .unwrap();
        assert_eq!(spans[0].output.len(), CLIP_MAX_BYTES + CLIP_SUFFIX.len());
    }

    #[test]
    fn test_short_fields_untouched() {
        let spans = ClipProcessor
            .transform(vec![span_with_input("short".to_string())])
            .unwrap();
        assert_eq!(spans[0].input, "short");
    }

    #[test]
    fn test_json_object_clips_only_long_leaf() {
        let large = "b".repeat(CLIP_MAX_BYTES + 10);
        let content = serde_json::json!({"large": large, "normal": "ok"}).to_string();
        let spans = ClipProcessor
            .transform(vec![span_with_input(content)])
            .unwrap();

        let result: serde_json::Value = serde_json::from_str(&spans[0].input).unwrap();
        assert_eq!(result["normal"], "ok");
        assert_eq!(
            result["large"].as_str().unwrap(),
            clip_plain_text(&large)
        );
    }

    #[test]
    fn test_json_nested_and_array_leaves() {
        let large = "c".repeat(CLIP_MAX_BYTES + 20);
        let content = serde_json::json!({
            "levels": [{"inner": [large.clone(), "ok"]}]
        })
        .to_string();
        let spans = ClipProcessor
            .transform(vec![span_with_input(content)])
            .unwrap();

        let result: serde_json::Value = serde_json::from_str(&spans[0].input).unwrap();
        let inner = &result["levels"][0]["inner"];
        assert_eq!(inner[0].as_str().unwrap(), clip_plain_text(&large));
        assert_eq!(inner[1], "ok");
    }

    #[test]
    fn test_json_string_document() {
        let large = "e".repeat(CLIP_MAX_BYTES + 40);
        let content = serde_json::to_string(&large).unwrap();
        let clipped = clip_span_field(&content);
        let result: String = serde_json::from_str(&clipped).unwrap();
        assert_eq!(result, clip_plain_text(&large));
    }

    #[test]
    fn test_clip_is_utf8_safe() {
        let content = "只能制定计划让执行代理分析代码仓库结构。".repeat(400);
        assert!(content.len() > CLIP_MAX_BYTES);
        let clipped = clip_plain_text(&content);
        assert!(clipped.ends_with(CLIP_SUFFIX));
        assert!(!clipped.contains('\u{fffd}'));
        assert!(clipped.starts_with("只能制定计划"));
    }

    #[test]
    fn test_json_fallback_keeps_valid_json() {
        let message = "好".repeat(CLIP_MAX_BYTES / 3 + 20);
        let content = serde_json::json!({"message": message}).to_string();
        let result = clip_span_field(&content);

        let parsed: serde_json::Value = serde_json::from_str(&result).unwrap();
        let leaf = parsed["message"].as_str().unwrap();
        assert!(leaf.ends_with(CLIP_SUFFIX));
        assert!(leaf.starts_with('好'));
    }

    #[test]
    fn test_non_json_over_bound_clipped_as_text() {
        let content = "目标风".repeat(2000);
        let result = clip_span_field(&content);
        assert!(result.ends_with(CLIP_SUFFIX));
        assert!(!result.contains('\u{fffd}'));
    }

    #[test]
    fn test_clip_by_byte_limit_edge_cases() {
        let content = "abc你好";
        assert_eq!(clip_by_byte_limit(content, 0), "");
        assert_eq!(clip_by_byte_limit(content, content.len()), content);
        assert_eq!(clip_by_byte_limit(content, "abc你".len()), "abc你");
        assert_eq!(clip_by_byte_limit(content, "abc你".len() + 1), "abc你");
        assert_eq!(clip_by_byte_limit("你好", 1), "");
    }

    #[test]
    fn test_unchanged_json_is_none() {
        assert!(clip_json_content("not-json").is_none());
        let raw = serde_json::json!(["foo", "bar"]).to_string();
        assert!(clip_json_content(&raw).is_none());
    }

    #[test]
    fn test_transform_returns_all_spans() {
        let spans = ClipProcessor
            .transform(vec![
                span_with_input("short".to_string()),
                span_with_input("also short".to_string()),
            ])
            .unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].input, "short");
    }

    #[test]
    fn test_factory_builds_processor() {
        let processor = ClipFactory.create(&Settings::default()).unwrap();
        let content = "a".repeat(CLIP_MAX_BYTES + 1);
        let spans = processor.transform(vec![span_with_input(content)]).unwrap();
        assert!(spans[0].input.ends_with(CLIP_SUFFIX));
    }
}
