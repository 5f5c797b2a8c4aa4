//! Channel adapter trait.

use async_trait::async_trait;
use herald_core::{ChannelKind, MessageMeta, SendOutcome};

/// A delivery channel.
///
/// An adapter translates one `(recipient, meta)` pair into one outbound
/// transport call and one [`SendOutcome`]. Implementations fan out through
/// [`send_batch`](crate::send_batch), which enforces pacing, bounded
/// concurrency, input validation, and positional results — the i-th
/// outcome always corresponds to the i-th recipient.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// The channel this adapter serves.
    fn kind(&self) -> ChannelKind;

    /// Send to a batch of recipients.
    ///
    /// Never fails as a whole: per-recipient problems are reported in the
    /// returned outcomes, which are index-aligned with `recipients`.
    async fn send(&self, recipients: &[String], metas: &[MessageMeta]) -> Vec<SendOutcome>;
}
