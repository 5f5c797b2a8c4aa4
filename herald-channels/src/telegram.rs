//! Chat message channel over the Telegram Bot API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::{send_batch, ChannelAdapter, ChannelError, Result};
use herald_core::{redact_recipient, sanitize_error_key, ChannelKind, MessageMeta, SendOutcome, TelegramMeta};
use herald_ratelimit::MinTimeLimiter;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_PARSE_MODE: &str = "HTML";

/// Telegram channel configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather.
    pub bot_token: String,
    /// API base URL (override for tests or proxies).
    pub api_base: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Outbound sends per second.
    pub rate_per_second: u32,
    /// Maximum concurrent sends.
    pub concurrency: usize,
}

impl TelegramConfig {
    /// Create a configuration from a bot token.
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            rate_per_second: 25,
            concurrency: 5,
        }
    }

    /// Override the API base URL.
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
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

struct TelegramInner {
    client: Client,
    send_message_url: String,
    limiter: Arc<MinTimeLimiter>,
    concurrency: usize,
}

/// Chat bot channel.
pub struct TelegramChannel {
    inner: Arc<TelegramInner>,
}

impl TelegramChannel {
    /// Create the channel.
    ///
    /// Fails with a configuration error when the bot token is empty.
    pub fn new(config: TelegramConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            return Err(ChannelError::Config("bot token is required".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChannelError::Config(e.to_string()))?;

        let limiter = MinTimeLimiter::per_second(config.concurrency, config.rate_per_second)
            .map_err(|e| ChannelError::Config(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(TelegramInner {
                client,
                send_message_url: format!(
                    "{}/bot{}/sendMessage",
                    config.api_base.trim_end_matches('/'),
                    config.bot_token
                ),
                limiter: Arc::new(limiter),
                concurrency: config.concurrency,
            }),
        })
    }
}

/// Build the `sendMessage` request body.
fn build_request(chat_id: &str, text: &str, meta: &TelegramMeta) -> Value {
    let mut body = serde_json::Map::new();
    body.insert("chat_id".to_string(), json!(chat_id));
    body.insert("text".to_string(), json!(text));
    body.insert(
        "parse_mode".to_string(),
        json!(meta.parse_mode.as_deref().unwrap_or(DEFAULT_PARSE_MODE)),
    );
    for (key, value) in &meta.extra {
        body.insert(key.clone(), value.clone());
    }
    Value::Object(body)
}

async fn send_one(inner: Arc<TelegramInner>, recipient: String, meta: TelegramMeta) -> SendOutcome {
    let Some(text) = meta.text.clone() else {
        return SendOutcome::failure(recipient, "MISSING_TEXT");
    };

    debug!(component = "telegram", recipient = %redact_recipient(&recipient), "sending chat message");

    let request = build_request(&recipient, &text, &meta);
    let response = inner
        .client
        .post(&inner.send_message_url)
        .json(&request)
        .send()
        .await;

    match response {
        Ok(response) => {
            let http_status = response.status().as_u16();
            let body: Value = response.json().await.unwrap_or(Value::Null);

            if body["ok"].as_bool().unwrap_or(false) {
                // the result is the Bot API message object, message_id included
                SendOutcome::success(&recipient, body["result"].clone())
            } else {
                let code = body["error_code"]
                    .as_u64()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| http_status.to_string());
                let description = body["description"]
                    .as_str()
                    .unwrap_or("request rejected")
                    .to_string();
                SendOutcome::failure(&recipient, sanitize_error_key(&code, &description))
            }
        }
        Err(e) => {
            let code = if e.is_timeout() { "ETIMEDOUT" } else { "ECONNECTION" };
            SendOutcome::failure(&recipient, sanitize_error_key(code, &e.to_string()))
        }
    }
}

#[async_trait]
impl ChannelAdapter for TelegramChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    async fn send(&self, recipients: &[String], metas: &[MessageMeta]) -> Vec<SendOutcome> {
        let limiter = self.inner.limiter.clone();
        let inner = self.inner.clone();

        send_batch(
            ChannelKind::Telegram,
            recipients,
            metas,
            &limiter,
            self.inner.concurrency,
            move |_i, recipient, meta| {
                let inner = inner.clone();
                async move {
                    let MessageMeta::Telegram(meta) = meta else {
                        return SendOutcome::failure(recipient, "Missing meta for recipient");
                    };
                    send_one(inner, recipient, meta).await
                }
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = TelegramConfig::new("123456:token");

        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.rate_per_second, 25);
        assert_eq!(config.concurrency, 5);
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            TelegramChannel::new(TelegramConfig::new("  ")),
            Err(ChannelError::Config(_))
        ));
    }

    #[test]
    fn test_send_message_url() {
        let channel =
            TelegramChannel::new(TelegramConfig::new("42:abc").api_base("https://tg.local/"))
                .unwrap();

        assert_eq!(
            channel.inner.send_message_url,
            "https://tg.local/bot42:abc/sendMessage"
        );
    }

    #[test]
    fn test_request_defaults_parse_mode() {
        let meta = TelegramMeta::text("hello");
        let body = build_request("99", "hello", &meta);

        assert_eq!(body["chat_id"], "99");
        assert_eq!(body["text"], "hello");
        assert_eq!(body["parse_mode"], "HTML");
    }

    #[test]
    fn test_request_keeps_explicit_parse_mode_and_extras() {
        let meta = TelegramMeta {
            text: Some("hello".to_string()),
            parse_mode: Some("MarkdownV2".to_string()),
            extra: serde_json::from_str(r#"{"disable_notification": true}"#).unwrap(),
        };
        let body = build_request("99", "hello", &meta);

        assert_eq!(body["parse_mode"], "MarkdownV2");
        assert_eq!(body["disable_notification"], true);
    }

    #[tokio::test]
    async fn test_missing_text_short_circuits() {
        let channel = TelegramChannel::new(TelegramConfig::new("42:abc")).unwrap();

        let outcomes = channel
            .send(
                &["1234567".to_string()],
                &[MessageMeta::Telegram(TelegramMeta::default())],
            )
            .await;

        assert_eq!(outcomes[0].error.as_deref(), Some("MISSING_TEXT"));
        assert_eq!(outcomes[0].recipient, "1234567");
    }
}
