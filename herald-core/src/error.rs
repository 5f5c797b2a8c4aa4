//! Core error types.

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad construction-time input.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Job payload failed structural validation.
    #[error("Invalid job payload: {0}")]
    InvalidJob(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
