//! Rate limiting error types.

use thiserror::Error;

/// Result type for rate limiting operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Rate limiting errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The limiter was closed before the task started.
    #[error("Task cancelled: limiter closed")]
    Cancelled,
}
