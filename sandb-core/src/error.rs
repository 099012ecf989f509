//! Error types for sanDB

use thiserror::Error;

/// Result type alias for sanDB operations
pub type Result<T> = std::result::Result<T, SanError>;

/// sanDB error types
#[derive(Error, Debug)]
pub enum SanError {
    /// Collection directory does not exist
    #[error("Collection '{0}' does not exist")]
    CollectionNotFound(String),

    /// Collection directory already exists
    #[error("Collection '{0}' already exists")]
    CollectionExists(String),

    /// Malformed timestamps, intervals, pagination or names
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A segment file does not decode to a valid mapping
    #[error("Corrupt segment: {0}")]
    CorruptSegment(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SanError {
    /// Check if error indicates corruption
    pub fn is_corruption(&self) -> bool {
        matches!(self, SanError::CorruptSegment(_))
    }

    /// Check if the caller is at fault (bad request rather than server failure)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            SanError::CollectionNotFound(_)
                | SanError::CollectionExists(_)
                | SanError::InvalidInput(_)
        )
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        SanError::InvalidInput(msg.into())
    }
}
