//! # Herald Core
//!
//! Shared types and primitives for the Herald notification fan-out engine.
//!
//! ## Features
//!
//! - **Job payloads**: channel-tagged recipient batches handed from producers to workers
//! - **Send outcomes**: uniform per-recipient results with stable error keys
//! - **Sanitization**: error-key normalization and recipient redaction for logs
//! - **Retry**: exponential-backoff wrapper for transient external calls
//!
//! ## Quick Start
//!
//! ```rust
//! use herald_core::{ChannelKind, JobPayload, MessageMeta, TelegramMeta};
//!
//! let payload = JobPayload::new(ChannelKind::Telegram)
//!     .recipient(
//!         "1234567",
//!         MessageMeta::Telegram(TelegramMeta::text("Your order has shipped")),
//!     )
//!     .tracking("orders:stats");
//!
//! assert!(payload.validate().is_ok());
//! ```

mod error;
mod job;
mod outcome;
mod retry;
mod sanitize;
mod telemetry;

pub use error::{CoreError, Result};
pub use job::{
    ChannelKind, EmailAttachment, EmailMeta, FirebaseMeta, JobPayload, MessageMeta, TelegramMeta,
    WebMeta, DEFAULT_TRACKING_KEY,
};
pub use outcome::{SendOutcome, SendStatus, StatsHash};
pub use retry::retry_with_backoff;
pub use sanitize::{redact_recipient, sanitize_error_key, truncate_error_key, MAX_ERROR_KEY_LEN};
pub use telemetry::init_tracing;

/// Prelude for common imports.
///
/// ```
/// use herald_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{CoreError, Result};
    pub use crate::job::{ChannelKind, JobPayload, MessageMeta};
    pub use crate::outcome::{SendOutcome, SendStatus, StatsHash};
    pub use crate::retry::retry_with_backoff;
    pub use crate::sanitize::{redact_recipient, sanitize_error_key};
}
