//! Job payloads handed from producers to workers.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::{CoreError, Result};

/// Tracking key used when the caller does not choose one.
pub const DEFAULT_TRACKING_KEY: &str = "notifications:stats";

/// Delivery channel selector.
///
/// Each variant resolves to one registered adapter in the worker process.
/// Adding a channel means adding a variant here and a matching
/// [`MessageMeta`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    /// Transactional email over SMTP.
    Email,
    /// Mobile push through Firebase Cloud Messaging.
    Firebase,
    /// Chat messages through the Telegram Bot API.
    Telegram,
    /// Browser Web Push (VAPID).
    Web,
}

impl ChannelKind {
    /// Wire name of the channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Firebase => "firebase",
            Self::Telegram => "telegram",
            Self::Web => "web",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Email attachment, content carried base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAttachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// MIME type; `application/octet-stream` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Base64-encoded file content.
    pub content: String,
}

/// Per-recipient email content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMeta {
    /// Message subject. Sends without one are rejected per recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Plain text body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// HTML body, preferred over `text` when both are present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Attachments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<EmailAttachment>,
}

impl EmailMeta {
    /// Create meta with a subject and plain text body.
    pub fn text(subject: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Create meta with a subject and HTML body.
    pub fn html(subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            html: Some(html.into()),
            ..Default::default()
        }
    }
}

/// Per-recipient mobile-push content.
///
/// The platform-specific sections are opaque passthroughs; the adapter
/// forwards them to FCM untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseMeta {
    /// Notification title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Notification body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Explicit notification block, overrides `title`/`body`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Value>,
    /// Data-only payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Android-specific overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android: Option<Value>,
    /// APNs-specific overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apns: Option<Value>,
    /// Web-push-specific overrides.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webpush: Option<Value>,
    /// FCM options (analytics labels etc.).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcm_options: Option<Value>,
}

impl FirebaseMeta {
    /// Create meta with a title and body.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            body: Some(body.into()),
            ..Default::default()
        }
    }
}

/// Per-recipient chat message content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramMeta {
    /// Message text. Sends without it are rejected per recipient.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Parse mode, `HTML` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
    /// Passthrough formatting fields forwarded to the Bot API.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl TelegramMeta {
    /// Create meta with message text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Per-recipient Web Push content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebMeta {
    /// Notification title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Notification body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Icon URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Image URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Badge URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    /// Custom data payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Time to live in seconds.
    #[serde(rename = "TTL", skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    /// Extra request headers (`Urgency`, `Topic`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl WebMeta {
    /// Create meta with a title and body.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            body: Some(body.into()),
            ..Default::default()
        }
    }
}

/// Channel-tagged per-recipient message content.
///
/// The tag mirrors the job's [`ChannelKind`]; a payload is structurally
/// valid only when every meta entry carries the job's channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "lowercase")]
pub enum MessageMeta {
    /// Email content.
    Email(EmailMeta),
    /// Mobile push content.
    Firebase(FirebaseMeta),
    /// Chat message content.
    Telegram(TelegramMeta),
    /// Web Push content.
    Web(WebMeta),
}

impl MessageMeta {
    /// Channel this meta belongs to.
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Email(_) => ChannelKind::Email,
            Self::Firebase(_) => ChannelKind::Firebase,
            Self::Telegram(_) => ChannelKind::Telegram,
            Self::Web(_) => ChannelKind::Web,
        }
    }

    /// All-defaults meta for a channel.
    ///
    /// Used by the producer when building meta for one record fails: the
    /// slot is filled rather than the whole batch aborted.
    pub fn empty(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Email => Self::Email(EmailMeta::default()),
            ChannelKind::Firebase => Self::Firebase(FirebaseMeta::default()),
            ChannelKind::Telegram => Self::Telegram(TelegramMeta::default()),
            ChannelKind::Web => Self::Web(WebMeta::default()),
        }
    }
}

/// One queued unit of work: a batch of recipients for one channel.
///
/// Producers build payloads, the queue persists them, exactly one worker
/// claims each and fans it out through the channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    /// Recipient identifiers, channel-specific interpretation.
    pub user_ids: Vec<String>,
    /// Channel selecting the adapter.
    pub channel: ChannelKind,
    /// Per-recipient content, index-aligned with `user_ids`.
    pub meta: Vec<MessageMeta>,
    /// When true the worker records per-recipient outcome counters.
    #[serde(default)]
    pub track_responses: bool,
    /// Hash key under which outcome counters accumulate.
    #[serde(default = "default_tracking_key")]
    pub tracking_key: String,
    /// Logical grouping for cooperative cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
}

fn default_tracking_key() -> String {
    DEFAULT_TRACKING_KEY.to_string()
}

impl JobPayload {
    /// Create an empty payload for a channel.
    pub fn new(channel: ChannelKind) -> Self {
        Self {
            user_ids: Vec::new(),
            channel,
            meta: Vec::new(),
            track_responses: false,
            tracking_key: default_tracking_key(),
            campaign_id: None,
        }
    }

    /// Append one recipient with its meta.
    pub fn recipient(mut self, user_id: impl Into<String>, meta: MessageMeta) -> Self {
        self.user_ids.push(user_id.into());
        self.meta.push(meta);
        self
    }

    /// Enable response tracking under a key.
    pub fn tracking(mut self, key: impl Into<String>) -> Self {
        self.track_responses = true;
        self.tracking_key = key.into();
        self
    }

    /// Set the campaign id.
    pub fn campaign(mut self, campaign_id: impl Into<String>) -> Self {
        self.campaign_id = Some(campaign_id.into());
        self
    }

    /// Number of recipients in the batch.
    pub fn len(&self) -> usize {
        self.user_ids.len()
    }

    /// Whether the batch holds no recipients.
    pub fn is_empty(&self) -> bool {
        self.user_ids.is_empty()
    }

    /// Check the structural invariants of the payload.
    ///
    /// Recipients and meta must be non-empty, index-aligned, and every
    /// meta entry must carry the job's channel.
    pub fn validate(&self) -> Result<()> {
        if self.user_ids.is_empty() {
            return Err(CoreError::InvalidJob("userIds is empty".to_string()));
        }
        if self.user_ids.len() != self.meta.len() {
            return Err(CoreError::InvalidJob(format!(
                "userIds/meta length mismatch: {} != {}",
                self.user_ids.len(),
                self.meta.len()
            )));
        }
        if let Some(pos) = self.meta.iter().position(|m| m.kind() != self.channel) {
            return Err(CoreError::InvalidJob(format!(
                "meta at index {} is for channel '{}', job channel is '{}'",
                pos,
                self.meta[pos].kind(),
                self.channel
            )));
        }
        Ok(())
    }
}
