//! Channel error types.

use thiserror::Error;

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Channel errors.
///
/// These cover construction and lookup only. Per-recipient send failures
/// never surface as errors; they are mapped into
/// [`SendOutcome`](herald_core::SendOutcome) error keys inside the batch
/// sender.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport SDK initialization failed.
    #[error("Initialization error: {0}")]
    Init(String),

    /// No adapter registered under the requested channel name.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ChannelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
