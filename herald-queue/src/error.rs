//! Error types for queue operations.

use thiserror::Error;

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Queue-specific errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Shared store error.
    #[error("Store error: {0}")]
    Store(#[from] herald_redis::StoreError),

    /// Channel resolution error.
    #[error("Channel error: {0}")]
    Channel(#[from] herald_channels::ChannelError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Job payload failed structural validation.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-supplied record source failed.
    #[error("Record source error: {0}")]
    Source(String),

    /// A concurrent batch handler failed unexpectedly.
    #[error("Batch handler failed: {0}")]
    ExecutionFailed(String),

    /// Cooperative cancellation.
    #[error("Cancelled")]
    Cancelled,
}

impl QueueError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::Source(_) => true,
            _ => false,
        }
    }
}

impl From<herald_core::CoreError> for QueueError {
    fn from(err: herald_core::CoreError) -> Self {
        match err {
            herald_core::CoreError::InvalidJob(msg) => Self::InvalidJob(msg),
            herald_core::CoreError::Config(msg) => Self::Config(msg),
            herald_core::CoreError::Serialization(msg) => Self::Serialization(msg),
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
