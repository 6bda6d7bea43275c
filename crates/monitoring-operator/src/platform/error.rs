//! Platform API error types.

use thiserror::Error;

/// Errors returned by a [`PlatformClient`](super::PlatformClient).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Object {object} rejected: {reason}")]
    Rejected { object: String, reason: String },

    #[error("Conflict while updating {object}: {reason}")]
    Conflict { object: String, reason: String },

    #[error("Platform API unavailable: {0}")]
    Unavailable(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Platform call cancelled")]
    Cancelled,
}

impl PlatformError {
    /// Returns true if the error is likely transient and the call can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::Conflict { .. } | PlatformError::Unavailable(_)
        )
    }
}

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;
