//! Engine error taxonomy
//!
//! Request-level failures only. Field- and item-level problems during an
//! export are captured as [`crate::data::types::ItemError`] entries and
//! aggregated into error groups instead of failing the request.

use thiserror::Error;

use crate::data::error::DataError;

#[derive(Error, Debug)]
pub enum EngineError {
    /// No spans match the requested ids / time range
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// Missing or malformed request parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Fail-closed chain-resolution authorization
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// Pipeline invariant violation, unresolved field key, serialization
    /// failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Passthrough from a storage or provider collaborator
    #[error(transparent)]
    Data(#[from] DataError),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = EngineError::ResourceNotFound("no spans for trace t1".to_string());
        assert_eq!(err.to_string(), "Resource not found: no spans for trace t1");
    }

    #[test]
    fn test_data_error_passthrough() {
        let err: EngineError = DataError::Store("timeout".to_string()).into();
        assert_eq!(err.to_string(), "Span store error: timeout");
    }
}
