//! Span filter expressions
//!
//! A predicate tree handed to the span store's query layer: a list of leaf
//! predicates joined by a single boolean operator per nesting level. Leaves
//! may themselves hold a sub-expression, which is how `(A) OR (B)` queries
//! such as the trajectory selection are composed.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Long,
    Double,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOp {
    In,
    NotIn,
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    #[default]
    And,
    Or,
}

/// One leaf predicate, or a nested sub-expression.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FilterField {
    #[serde(default)]
    pub field_name: String,
    #[serde(default = "default_field_type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub op: Option<QueryOp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_filter: Option<Box<FilterExpression>>,
}

fn default_field_type() -> FieldType {
    FieldType::String
}

impl FilterField {
    /// String-typed `field IN values` predicate.
    pub fn in_list(field_name: &str, values: Vec<String>) -> Self {
        Self {
            field_name: field_name.to_string(),
            field_type: FieldType::String,
            values,
            op: Some(QueryOp::In),
            sub_filter: None,
        }
    }

    /// Wrap a sub-expression as a leaf.
    pub fn sub(expr: FilterExpression) -> Self {
        Self {
            field_name: String::new(),
            field_type: FieldType::String,
            values: Vec::new(),
            op: None,
            sub_filter: Some(Box::new(expr)),
        }
    }
}

/// A predicate tree: `fields` joined by `op` (AND when unset).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FilterExpression {
    #[serde(default)]
    pub op: Option<LogicalOp>,
    #[serde(default)]
    pub fields: Vec<FilterField>,
}

impl FilterExpression {
    pub fn and(fields: Vec<FilterField>) -> Self {
        Self {
            op: Some(LogicalOp::And),
            fields,
        }
    }

    pub fn or(fields: Vec<FilterField>) -> Self {
        Self {
            op: Some(LogicalOp::Or),
            fields,
        }
    }

    pub fn effective_op(&self) -> LogicalOp {
        self.op.unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate the whole tree before handing it to the store.
    pub fn validate(&self) -> EngineResult<()> {
        for field in &self.fields {
            if let Some(sub) = &field.sub_filter {
                sub.validate()?;
                continue;
            }
            let Some(op) = field.op else {
                return Err(EngineError::InvalidParameter(format!(
                    "filter field '{}' has no query operator",
                    field.field_name
                )));
            };
            if field.field_name.is_empty() {
                return Err(EngineError::InvalidParameter(
                    "filter field has no name".to_string(),
                ));
            }
            match op {
                QueryOp::Lt | QueryOp::Lte | QueryOp::Gt | QueryOp::Gte => {
                    if !matches!(field.field_type, FieldType::Long | FieldType::Double) {
                        return Err(EngineError::InvalidParameter(format!(
                            "comparison operator on non-numeric field '{}'",
                            field.field_name
                        )));
                    }
                }
                _ => {}
            }
            for value in &field.values {
                let ok = match field.field_type {
                    FieldType::String => true,
                    FieldType::Long => value.parse::<i64>().is_ok(),
                    FieldType::Double => value.parse::<f64>().is_ok(),
                    FieldType::Bool => value.parse::<bool>().is_ok(),
                };
                if !ok {
                    return Err(EngineError::InvalidParameter(format!(
                        "value '{}' does not parse as {:?} for field '{}'",
                        value, field.field_type, field.field_name
                    )));
                }
            }
        }
        Ok(())
    }
}
