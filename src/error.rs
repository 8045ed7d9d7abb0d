//! Error types for Synheart Cohort

use thiserror::Error;

/// Errors that can occur during feature computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Corrupt user document at index {index}: {reason}")]
    CorruptDocument { index: usize, reason: String },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create thread pool: {0}")]
    ThreadPool(String),
}

impl ComputeError {
    /// Whether this error only affects a single user document
    pub fn is_document_local(&self) -> bool {
        matches!(self, ComputeError::CorruptDocument { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_local_errors() {
        let corrupt = ComputeError::CorruptDocument {
            index: 2,
            reason: "missing user_id".to_string(),
        };
        assert!(corrupt.is_document_local());
        assert_eq!(
            corrupt.to_string(),
            "Corrupt user document at index 2: missing user_id"
        );
        assert!(!ComputeError::ConfigError("bad".to_string()).is_document_local());
    }
}
