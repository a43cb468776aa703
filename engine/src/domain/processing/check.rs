//! Consistency-check stage
//!
//! Validates batch-level invariants. A trace read must never mix workspaces:
//! every span in the batch has to carry the same workspace id, and when the
//! request names a workspace it must be that one. Any violation fails the
//! whole pipeline with no partial output.

use super::{ProcessorFactory, Settings, SpanProcessor};
use crate::data::types::Span;
use crate::error::{EngineError, EngineResult};

pub struct ConsistencyCheckProcessor {
    expected_workspace_id: Option<String>,
}

impl SpanProcessor for ConsistencyCheckProcessor {
    fn transform(&self, spans: Vec<Span>) -> EngineResult<Vec<Span>> {
        let mut batch_workspace: Option<&str> = self.expected_workspace_id.as_deref();
        for span in &spans {
            match batch_workspace {
                None => batch_workspace = Some(&span.workspace_id),
                Some(expected) if expected != span.workspace_id => {
                    return Err(EngineError::Internal(format!(
                        "span batch mixes workspaces: expected '{}', found '{}' on span '{}'",
                        expected, span.workspace_id, span.span_id
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(spans)
    }
}

pub struct ConsistencyCheckFactory;

impl ProcessorFactory for ConsistencyCheckFactory {
    fn create(&self, settings: &Settings) -> EngineResult<Box<dyn SpanProcessor>> {
        let expected_workspace_id = if settings.workspace_id.is_empty() {
            None
        } else {
            Some(settings.workspace_id.clone())
        };
        Ok(Box::new(ConsistencyCheckProcessor {
            expected_workspace_id,
        }))
    }
}
