//! Destination dataset model
//!
//! Datasets are owned by external dataset providers; the engine holds just
//! enough of their shape to resolve field mappings, validate content types,
//! and aggregate per-item errors into bounded groups.

use serde::{Deserialize, Serialize};

use crate::data::types::Span;

/// Literal span-field key that selects the precomputed trajectory instead of
/// a (field, jsonpath) rule.
pub const TRAJECTORY_FIELD_KEY: &str = "trajectory";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetCategory {
    #[default]
    General,
    Evaluation,
}

impl std::fmt::Display for DatasetCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetCategory::General => write!(f, "general"),
            DatasetCategory::Evaluation => write!(f, "evaluation"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum ContentType {
    #[default]
    Text,
    Image,
    Audio,
    MultiPart,
}

// =============================================================================
// Dataset & Schema
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Dataset {
    pub id: i64,
    pub workspace_id: String,
    pub name: String,
    pub category: DatasetCategory,
    pub schema: DatasetSchema,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatasetSchema {
    pub field_schemas: Vec<FieldSchema>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FieldSchema {
    /// Destination-assigned unique key; absent until the provider backfills it
    pub key: Option<String>,
    /// Display name; what callers reference in field mappings
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub content_type: ContentType,
}

impl Dataset {
    pub fn new(
        id: i64,
        workspace_id: &str,
        name: &str,
        category: DatasetCategory,
        schema: DatasetSchema,
    ) -> Self {
        Self {
            id,
            workspace_id: workspace_id.to_string(),
            name: name.to_string(),
            category,
            schema,
        }
    }

    /// Translate a field display name into the destination's field key.
    pub fn field_key_by_name(&self, name: &str) -> Option<&str> {
        self.schema
            .field_schemas
            .iter()
            .find(|fs| fs.name == name)
            .and_then(|fs| fs.key.as_deref())
            .filter(|key| !key.is_empty())
    }
}

/// Binds one destination field to an extraction rule over the span, or to
/// the literal trajectory.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FieldMapping {
    pub field_schema: FieldSchema,
    pub span_field_key: String,
    #[serde(default)]
    pub span_field_jsonpath: String,
}

impl FieldMapping {
    pub fn is_trajectory(&self) -> bool {
        self.span_field_key == TRAJECTORY_FIELD_KEY
    }
}

// =============================================================================
// Dataset Items
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorKind {
    /// Content fails its declared content type
    MismatchSchema,
    /// Destination refused further rows
    ExceedCapacity,
    /// Unresolved field key, trajectory serialization failure
    InternalError,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ItemError {
    pub kind: ItemErrorKind,
    pub message: String,
    #[serde(default)]
    pub field_names: Vec<String>,
}

/// Lineage of an exported item.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ItemSource {
    /// Import job that produced the item, when any
    pub job_id: Option<i64>,
}

/// One row destined for a dataset, mapped from a single span.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetItem {
    pub workspace_id: String,
    pub dataset_id: i64,
    pub trace_id: String,
    pub span_id: String,
    pub span_name: String,
    pub span_type: String,
    pub field_data: Vec<FieldData>,
    pub errors: Vec<ItemError>,
    pub source: Option<ItemSource>,
}

impl DatasetItem {
    pub fn from_span(workspace_id: &str, dataset_id: i64, span: &Span, source: Option<ItemSource>) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            dataset_id,
            trace_id: span.trace_id.clone(),
            span_id: span.span_id.clone(),
            span_name: span.span_name.clone(),
            span_type: span.span_type.clone(),
            field_data: Vec::new(),
            errors: Vec::new(),
            source,
        }
    }

    pub fn add_field_data(&mut self, key: &str, name: &str, content: Content) {
        self.field_data.push(FieldData {
            key: key.to_string(),
            name: name.to_string(),
            content,
        });
    }

    pub fn add_error(&mut self, kind: ItemErrorKind, message: &str, field_names: Vec<String>) {
        self.errors.push(ItemError {
            kind,
            message: message.to_string(),
            field_names,
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldData {
    /// Destination unique key
    pub key: String,
    /// Display column name
    pub name: String,
    pub content: Content,
}

// =============================================================================
// Content
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Content {
    pub content_type: ContentType,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multi_part: Vec<Content>,
}

impl Content {
    pub fn text(value: &str) -> Self {
        Self {
            content_type: ContentType::Text,
            text: value.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Image {
    #[serde(default)]
    pub name: String,
    pub url: String,
}

/// Wire shape of one part of a multi-part message payload.
#[derive(Debug, Clone, Deserialize)]
struct MessagePart {
    #[serde(rename = "type")]
    part_type: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    image_url: Option<Image>,
}

/// Type a raw extracted value according to the destination field's declared
/// content type.
///
/// Multi-part fields must parse as a structured message-parts payload; a
/// parse failure or an unsupported part type is a schema mismatch scoped to
/// that field alone. Every other declared type carries the value as text.
pub fn content_info(content_type: ContentType, value: &str) -> Result<Content, ItemErrorKind> {
    match content_type {
        ContentType::MultiPart => {
            let parts: Vec<MessagePart> = serde_json::from_str(value).map_err(|e| {
                tracing::info!(error = %e, "Multi-part payload did not parse");
                ItemErrorKind::MismatchSchema
            })?;
            let mut multi_part = Vec::with_capacity(parts.len());
            for part in parts {
                match part.part_type.as_str() {
                    "image_url" => {
                        let Some(image) = part.image_url else {
                            continue;
                        };
                        multi_part.push(Content {
                            content_type: ContentType::Image,
                            image: Some(image),
                            ..Default::default()
                        });
                    }
                    // Non-image parts are carried through as text
                    "text" | "file" => multi_part.push(Content::text(&part.text)),
                    other => {
                        tracing::warn!(part_type = other, "Unsupported message part type");
                        return Err(ItemErrorKind::MismatchSchema);
                    }
                }
            }
            Ok(Content {
                content_type: ContentType::MultiPart,
                multi_part,
                ..Default::default()
            })
        }
        _ => Ok(Content::text(value)),
    }
}

// =============================================================================
// Error Groups
// =============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ItemErrorGroup {
    pub kind: ItemErrorKind,
    pub summary: String,
    pub error_count: u32,
    /// Capped per call-site: 5 for interactive writes, 10 for import jobs
    #[serde(default)]
    pub details: Vec<ItemErrorDetail>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ItemErrorDetail {
    pub message: String,
    /// Index of the offending row in the built item batch, 0-based
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Inclusive index range for range-shaped errors (capacity overruns)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<u32>,
}

/// Merge build-time failures into the destination's error groups.
///
/// `items` is the full built batch in its original order, so detail indexes
/// reference the offending row even when successes interleave with failures.
/// Errors aggregate per item, not per field: only an item's first error
/// counts. Detail lists are clamped to `detail_cap` on both the merged-in
/// and the passthrough groups.
pub fn merge_error_groups(
    items: &[DatasetItem],
    provider_groups: Vec<ItemErrorGroup>,
    detail_cap: usize,
) -> Vec<ItemErrorGroup> {
    let mut groups = provider_groups;
    for group in &mut groups {
        group.details.truncate(detail_cap);
    }
    for (idx, item) in items.iter().enumerate() {
        let Some(first_error) = item.errors.first() else {
            continue;
        };
        match groups.iter_mut().find(|g| g.kind == first_error.kind) {
            Some(group) => {
                group.error_count += 1;
                if group.details.len() < detail_cap {
                    group.details.push(ItemErrorDetail {
                        message: first_error.message.clone(),
                        index: Some(idx as u32),
                        start_index: None,
                        end_index: None,
                    });
                }
            }
            None => groups.push(ItemErrorGroup {
                kind: first_error.kind,
                summary: first_error.message.clone(),
                error_count: 1,
                details: vec![ItemErrorDetail {
                    message: first_error.message.clone(),
                    index: Some(idx as u32),
                    start_index: None,
                    end_index: None,
                }],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_item(kind: ItemErrorKind, message: &str) -> DatasetItem {
        let mut item = DatasetItem::from_span("ws", 1, &Span::default(), None);
        item.add_error(kind, message, vec![]);
        item
    }

    #[test]
    fn test_field_key_by_name() {
        let dataset = Dataset::new(
            1,
            "ws",
            "d",
            DatasetCategory::General,
            DatasetSchema {
                field_schemas: vec![
                    FieldSchema {
                        key: Some("k1".to_string()),
                        name: "question".to_string(),
                        ..Default::default()
                    },
                    FieldSchema {
                        key: None,
                        name: "answer".to_string(),
                        ..Default::default()
                    },
                ],
            },
        );
        assert_eq!(dataset.field_key_by_name("question"), Some("k1"));
        assert_eq!(dataset.field_key_by_name("answer"), None);
        assert_eq!(dataset.field_key_by_name("missing"), None);
    }

    #[test]
    fn test_trajectory_mapping() {
        let mapping = FieldMapping {
            span_field_key: TRAJECTORY_FIELD_KEY.to_string(),
            ..Default::default()
        };
        assert!(mapping.is_trajectory());
        let mapping = FieldMapping {
            span_field_key: "input".to_string(),
            ..Default::default()
        };
        assert!(!mapping.is_trajectory());
    }

    #[test]
    fn test_content_info_text() {
        let content = content_info(ContentType::Text, "hello").unwrap();
        assert_eq!(content.content_type, ContentType::Text);
        assert_eq!(content.text, "hello");
    }

    #[test]
    fn test_content_info_multi_part() {
        let raw = r#"[
            {"type": "text", "text": "describe"},
            {"type": "image_url", "image_url": {"name": "img", "url": "http://x/y.png"}},
            {"type": "file", "text": "notes.txt"}
        ]"#;
        let content = content_info(ContentType::MultiPart, raw).unwrap();
        assert_eq!(content.content_type, ContentType::MultiPart);
        assert_eq!(content.multi_part.len(), 3);
        assert_eq!(content.multi_part[0].text, "describe");
        assert_eq!(
            content.multi_part[1].image.as_ref().unwrap().url,
            "http://x/y.png"
        );
    }

    #[test]
    fn test_content_info_multi_part_parse_failure() {
        let err = content_info(ContentType::MultiPart, "plain text").unwrap_err();
        assert_eq!(err, ItemErrorKind::MismatchSchema);
    }

    #[test]
    fn test_content_info_multi_part_unknown_type() {
        let raw = r#"[{"type": "video", "text": ""}]"#;
        let err = content_info(ContentType::MultiPart, raw).unwrap_err();
        assert_eq!(err, ItemErrorKind::MismatchSchema);
    }

    #[test]
    fn test_merge_into_existing_group() {
        let provider_groups = vec![ItemErrorGroup {
            kind: ItemErrorKind::MismatchSchema,
            summary: "bad schema".to_string(),
            error_count: 2,
            details: vec![],
        }];
        let failed = vec![failed_item(ItemErrorKind::MismatchSchema, "invalid multi part")];
        let merged = merge_error_groups(&failed, provider_groups, 5);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].error_count, 3);
        assert_eq!(merged[0].details.len(), 1);
    }

    #[test]
    fn test_merge_creates_new_group() {
        let failed = vec![failed_item(ItemErrorKind::InternalError, "field key empty")];
        let merged = merge_error_groups(&failed, vec![], 5);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].kind, ItemErrorKind::InternalError);
        assert_eq!(merged[0].error_count, 1);
        assert_eq!(merged[0].summary, "field key empty");
    }

    #[test]
    fn test_detail_indexes_follow_item_order() {
        let clean = DatasetItem::from_span("ws", 1, &Span::default(), None);
        let items = vec![
            clean.clone(),
            failed_item(ItemErrorKind::MismatchSchema, "bad"),
            clean,
            failed_item(ItemErrorKind::MismatchSchema, "bad"),
        ];
        let merged = merge_error_groups(&items, vec![], 5);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].error_count, 2);
        let indexes: Vec<u32> = merged[0].details.iter().filter_map(|d| d.index).collect();
        assert_eq!(indexes, vec![1, 3]);
    }

    #[test]
    fn test_detail_cap_is_enforced() {
        let failed: Vec<DatasetItem> = (0..20)
            .map(|_| failed_item(ItemErrorKind::MismatchSchema, "bad"))
            .collect();
        let merged = merge_error_groups(&failed, vec![], 5);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].error_count, 20);
        assert_eq!(merged[0].details.len(), 5);

        let merged = merge_error_groups(&failed, vec![], 10);
        assert_eq!(merged[0].details.len(), 10);
    }

    #[test]
    fn test_provider_details_clamped_too() {
        let provider_groups = vec![ItemErrorGroup {
            kind: ItemErrorKind::ExceedCapacity,
            summary: "over capacity".to_string(),
            error_count: 12,
            details: (0..12)
                .map(|i| ItemErrorDetail {
                    message: "row rejected".to_string(),
                    index: Some(i),
                    start_index: None,
                    end_index: None,
                })
                .collect(),
        }];
        let merged = merge_error_groups(&[], provider_groups, 5);
        assert_eq!(merged[0].details.len(), 5);
        assert_eq!(merged[0].error_count, 12);
    }
}
