//! Error types for tripmem
//!
//! One error hierarchy for the preference store, the semantic memory store and
//! the exchange layer. "Not found" is deliberately absent: missing records are
//! resolved to empty values, never surfaced.

use thiserror::Error;

/// The main error type for tripmem operations
#[derive(Error, Debug)]
pub enum Error {
    // ========== Storage Errors ==========
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Data corruption detected: {0}")]
    DataCorruption(String),

    // ========== Embedding Errors ==========
    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    // ========== Serialization Errors ==========
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ========== IO Errors ==========
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ========== Configuration Errors ==========
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ========== Validation Errors ==========
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Invalid entry id: {0}")]
    InvalidEntryId(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========== Internal Errors ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for tripmem operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if this error indicates data corruption
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::DataCorruption(_) | Error::Deserialization(_))
    }

    /// Returns true if the error came from the embedding provider
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Error::Embedding(_))
    }

    /// Returns true if the error rejects a single record rather than the store
    pub fn is_entry_level(&self) -> bool {
        matches!(
            self,
            Error::DimensionMismatch { .. }
                | Error::InvalidEntryId(_)
                | Error::InvalidUserId(_)
                | Error::InvalidInput(_)
                | Error::Embedding(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DimensionMismatch {
            expected: 384,
            got: 2,
        };
        assert_eq!(
            err.to_string(),
            "Embedding dimension mismatch: expected 384, got 2"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::DataCorruption("bad json".to_string()).is_corruption());
        assert!(Error::Embedding("timeout".to_string()).is_provider_failure());
        assert!(!Error::Storage("disk".to_string()).is_provider_failure());
    }

    #[test]
    fn test_entry_level_errors() {
        assert!(Error::DimensionMismatch { expected: 3, got: 2 }.is_entry_level());
        assert!(Error::InvalidEntryId(String::new()).is_entry_level());
        assert!(!Error::Storage("disk".to_string()).is_entry_level());
        assert!(!Error::Internal("lock".to_string()).is_entry_level());
    }
}
