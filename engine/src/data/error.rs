//! Data-layer error types

use thiserror::Error;

/// Errors surfaced by the engine's storage and provider collaborators.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Span store error: {0}")]
    Store(String),

    #[error("Dataset provider error: {0}")]
    Provider(String),

    #[error("Trajectory config store error: {0}")]
    Config(String),

    #[error("Annotation queue closed")]
    QueueClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = DataError::Store("connection refused".to_string());
        assert_eq!(err.to_string(), "Span store error: connection refused");
    }

    #[test]
    fn test_provider_error_display() {
        let err = DataError::Provider("capacity exceeded".to_string());
        assert_eq!(err.to_string(), "Dataset provider error: capacity exceeded");
    }

    #[test]
    fn test_queue_closed_display() {
        assert_eq!(DataError::QueueClosed.to_string(), "Annotation queue closed");
    }
}
