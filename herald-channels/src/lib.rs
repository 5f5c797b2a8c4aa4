//! # Herald Channels
//!
//! Channel adapters and batch send orchestration for the Herald
//! notification fan-out engine.
//!
//! ## Features
//!
//! - **Batch sender**: validates recipient/meta pairs, schedules sends
//!   through a pacing limiter with bounded concurrency, and yields
//!   positional per-recipient outcomes
//! - **Email**: transactional email over SMTP (lettre, pooled)
//! - **Firebase**: mobile push over FCM HTTP v1, one send per token
//! - **Telegram**: chat messages over the Bot API
//! - **Web Push**: VAPID browser push from serialized subscriptions
//! - **Registry**: per-process channel name → adapter mapping
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use herald_channels::{ChannelRegistry, TelegramChannel, TelegramConfig};
//!
//! let registry = ChannelRegistry::new();
//! let telegram = TelegramChannel::new(TelegramConfig::new("123456:bot-token"))?;
//! registry.register(Arc::new(telegram));
//!
//! let adapter = registry.get(herald_core::ChannelKind::Telegram)?;
//! let outcomes = adapter.send(&recipients, &metas).await;
//! ```

mod adapter;
mod batch;
mod email;
mod error;
mod firebase;
mod registry;
mod telegram;
mod web_push;

pub use adapter::ChannelAdapter;
pub use batch::send_batch;
pub use email::{EmailChannel, EmailConfig, SmtpSecurity};
pub use error::{ChannelError, Result};
pub use firebase::{FcmCredentialsSource, FirebaseChannel, FirebaseConfig};
pub use registry::ChannelRegistry;
pub use telegram::{TelegramChannel, TelegramConfig};
pub use web_push::{WebPushChannel, WebPushConfig};

/// Prelude for common imports.
///
/// ```
/// use herald_channels::prelude::*;
/// ```
pub mod prelude {
    pub use crate::adapter::ChannelAdapter;
    pub use crate::batch::send_batch;
    pub use crate::email::{EmailChannel, EmailConfig, SmtpSecurity};
    pub use crate::error::{ChannelError, Result};
    pub use crate::firebase::{FcmCredentialsSource, FirebaseChannel, FirebaseConfig};
    pub use crate::registry::ChannelRegistry;
    pub use crate::telegram::{TelegramChannel, TelegramConfig};
    pub use crate::web_push::{WebPushChannel, WebPushConfig};
}
