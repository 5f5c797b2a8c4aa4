//! Browser Web Push channel (VAPID).
//!
//! Recipients are JSON-serialized browser subscriptions rather than plain
//! addresses; an unparseable subscription is reported under a synthetic
//! recipient so the outcome still lines up with its input index.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushMessageBuilder,
};

use crate::{send_batch, ChannelAdapter, ChannelError, Result};
use herald_core::{sanitize_error_key, ChannelKind, MessageMeta, SendOutcome, WebMeta};
use herald_ratelimit::MinTimeLimiter;

/// Process-global VAPID details.
///
/// Installed once before the first send; re-initialization is a no-op
/// that keeps the originally installed details.
#[derive(Debug, Clone)]
struct VapidDetails {
    private_key: String,
    subject: String,
}

static VAPID: OnceLock<VapidDetails> = OnceLock::new();

/// Web Push channel configuration.
#[derive(Debug, Clone)]
pub struct WebPushConfig {
    /// VAPID public key (base64 URL-safe).
    pub public_key: String,
    /// VAPID private key (base64 URL-safe).
    pub private_key: String,
    /// Contact address placed in the VAPID `sub` claim.
    pub contact_email: String,
    /// TTL applied when the meta does not carry one, in seconds.
    pub default_ttl: u32,
    /// Outbound sends per second.
    pub rate_per_second: u32,
    /// Maximum concurrent sends.
    pub concurrency: usize,
}

impl WebPushConfig {
    /// Create a configuration from the VAPID key pair and contact.
    pub fn new(
        public_key: impl Into<String>,
        private_key: impl Into<String>,
        contact_email: impl Into<String>,
    ) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: private_key.into(),
            contact_email: contact_email.into(),
            default_ttl: 86400,
            rate_per_second: 50,
            concurrency: 5,
        }
    }

    /// Set the default TTL.
    pub fn default_ttl(mut self, ttl: u32) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the per-second send rate.
    pub fn rate_per_second(mut self, rate: u32) -> Self {
        self.rate_per_second = rate;
        self
    }

    /// Set the maximum concurrent sends.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

/// Browser subscription as serialized by `PushSubscription.toJSON()`.
#[derive(Debug, Clone, Deserialize)]
struct PushSubscription {
    endpoint: String,
    keys: SubscriptionKeys,
}

#[derive(Debug, Clone, Deserialize)]
struct SubscriptionKeys {
    p256dh: String,
    auth: String,
}

/// Parse and structurally validate a serialized subscription.
fn parse_subscription(raw: &str) -> Option<PushSubscription> {
    let subscription: PushSubscription = serde_json::from_str(raw).ok()?;
    if subscription.endpoint.trim().is_empty()
        || subscription.keys.p256dh.trim().is_empty()
        || subscription.keys.auth.trim().is_empty()
    {
        return None;
    }
    Some(subscription)
}

/// Build the JSON payload shown by the service worker.
///
/// When title, body and data are all absent the notification still goes
/// out, under a defaulted title.
fn build_payload(meta: &WebMeta) -> Value {
    let mut payload = serde_json::Map::new();

    let title = match (&meta.title, &meta.body, &meta.data) {
        (None, None, None) => {
            warn!(
                component = "web_push",
                "notification has no title, body or data, defaulting title"
            );
            Some("Notification".to_string())
        }
        _ => meta.title.clone(),
    };

    if let Some(title) = title {
        payload.insert("title".to_string(), json!(title));
    }
    if let Some(body) = &meta.body {
        payload.insert("body".to_string(), json!(body));
    }
    if let Some(icon) = &meta.icon {
        payload.insert("icon".to_string(), json!(icon));
    }
    if let Some(image) = &meta.image {
        payload.insert("image".to_string(), json!(image));
    }
    if let Some(badge) = &meta.badge {
        payload.insert("badge".to_string(), json!(badge));
    }
    if let Some(data) = &meta.data {
        payload.insert("data".to_string(), data.clone());
    }

    Value::Object(payload)
}

/// Map a push service failure to a conventional status code.
fn web_push_error_code(err: &web_push::WebPushError) -> &'static str {
    let text = err.to_string().to_lowercase();
    if text.contains("gone") || text.contains("expired") || text.contains("unsubscribed") {
        "410"
    } else if text.contains("not found") {
        "404"
    } else if text.contains("unauthorized") || text.contains("jwt") {
        "401"
    } else if text.contains("too large") || text.contains("payload") {
        "413"
    } else if text.contains("bad request") || text.contains("invalid") {
        "400"
    } else if text.contains("server error") {
        "500"
    } else {
        "N/A"
    }
}

struct WebPushInner {
    client: IsahcWebPushClient,
    vapid: VapidDetails,
    default_ttl: u32,
    limiter: Arc<MinTimeLimiter>,
    concurrency: usize,
}

/// Browser push channel.
pub struct WebPushChannel {
    inner: Arc<WebPushInner>,
}

impl WebPushChannel {
    /// Create the channel, installing the process-global VAPID details.
    ///
    /// Public key, private key and contact email are all required.
    pub fn new(config: WebPushConfig) -> Result<Self> {
        if config.public_key.trim().is_empty()
            || config.private_key.trim().is_empty()
            || config.contact_email.trim().is_empty()
        {
            return Err(ChannelError::Config(
                "web push requires public_key, private_key and contact_email".to_string(),
            ));
        }

        let subject = if config.contact_email.starts_with("mailto:")
            || config.contact_email.starts_with("https:")
        {
            config.contact_email.clone()
        } else {
            format!("mailto:{}", config.contact_email)
        };

        let vapid = VAPID
            .get_or_init(|| VapidDetails {
                private_key: config.private_key.clone(),
                subject,
            })
            .clone();

        let client =
            IsahcWebPushClient::new().map_err(|e| ChannelError::Config(e.to_string()))?;

        let limiter = MinTimeLimiter::per_second(config.concurrency, config.rate_per_second)
            .map_err(|e| ChannelError::Config(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(WebPushInner {
                client,
                vapid,
                default_ttl: config.default_ttl,
                limiter: Arc::new(limiter),
                concurrency: config.concurrency,
            }),
        })
    }
}

async fn send_one(
    inner: Arc<WebPushInner>,
    index: usize,
    recipient: String,
    meta: WebMeta,
) -> SendOutcome {
    let Some(subscription) = parse_subscription(&recipient) else {
        return SendOutcome::failure(
            format!("unparseable_sub_at_index_{}", index),
            "INVALID_SUBSCRIPTION_STRING",
        );
    };

    let payload = build_payload(&meta).to_string();
    let subscription_info = SubscriptionInfo::new(
        &subscription.endpoint,
        &subscription.keys.p256dh,
        &subscription.keys.auth,
    );

    let mut sig_builder = match VapidSignatureBuilder::from_base64(
        &inner.vapid.private_key,
        web_push::URL_SAFE_NO_PAD,
        &subscription_info,
    ) {
        Ok(builder) => builder,
        Err(e) => {
            return SendOutcome::failure(
                &recipient,
                sanitize_error_key(web_push_error_code(&e), &e.to_string()),
            );
        }
    };
    sig_builder.add_claim("sub", Value::String(inner.vapid.subject.clone()));

    let signature = match sig_builder.build() {
        Ok(signature) => signature,
        Err(e) => {
            return SendOutcome::failure(
                &recipient,
                sanitize_error_key(web_push_error_code(&e), &e.to_string()),
            );
        }
    };

    let mut builder = WebPushMessageBuilder::new(&subscription_info);
    builder.set_vapid_signature(signature);
    builder.set_payload(ContentEncoding::Aes128Gcm, payload.as_bytes());
    builder.set_ttl(meta.ttl.unwrap_or(inner.default_ttl));

    if let Some(headers) = &meta.headers
        && !headers.is_empty()
    {
        // the push client owns the request; extra headers are advisory
        debug!(
            component = "web_push",
            headers = ?headers.keys().collect::<Vec<_>>(),
            "extra web push headers are not forwarded by this transport"
        );
    }

    let message = match builder.build() {
        Ok(message) => message,
        Err(e) => {
            return SendOutcome::failure(
                &recipient,
                sanitize_error_key(web_push_error_code(&e), &e.to_string()),
            );
        }
    };

    debug!(component = "web_push", endpoint = %subscription.endpoint, "sending web push notification");

    match WebPushClient::send(&inner.client, message).await {
        Ok(()) => SendOutcome::success(&recipient, json!({ "delivered": true })),
        Err(e) => SendOutcome::failure(
            &recipient,
            sanitize_error_key(web_push_error_code(&e), &e.to_string()),
        ),
    }
}

#[async_trait]
impl ChannelAdapter for WebPushChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Web
    }

    async fn send(&self, recipients: &[String], metas: &[MessageMeta]) -> Vec<SendOutcome> {
        let limiter = self.inner.limiter.clone();
        let inner = self.inner.clone();

        send_batch(
            ChannelKind::Web,
            recipients,
            metas,
            &limiter,
            self.inner.concurrency,
            move |i, recipient, meta| {
                let inner = inner.clone();
                async move {
                    let MessageMeta::Web(meta) = meta else {
                        return SendOutcome::failure(recipient, "Missing meta for recipient");
                    };
                    send_one(inner, i, recipient, meta).await
                }
            },
        )
        .await
    }
}
