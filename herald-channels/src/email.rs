//! Transactional email channel over SMTP.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::PoolConfig;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::{send_batch, ChannelAdapter, ChannelError, Result};
use async_trait::async_trait;
use herald_core::{sanitize_error_key, ChannelKind, EmailMeta, MessageMeta, SendOutcome};
use herald_ratelimit::MinTimeLimiter;

/// SMTP connection pool cap.
const MAX_POOL_SIZE: u32 = 5;

/// SMTP security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmtpSecurity {
    /// No encryption (port 25, not recommended).
    None,
    /// STARTTLS upgrade (port 587).
    #[default]
    StartTls,
    /// Implicit TLS (port 465).
    Tls,
}

/// Email channel configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Security mode.
    pub security: SmtpSecurity,
    /// Username for authentication.
    pub username: Option<String>,
    /// Password for authentication.
    pub password: Option<String>,
    /// Connection timeout.
    pub timeout: Duration,
    /// Connection pool size, capped at [`MAX_POOL_SIZE`].
    pub pool_size: u32,
    /// Sender address placed in `From`.
    pub sender: String,
    /// Outbound sends per second.
    pub rate_per_second: u32,
    /// Maximum concurrent sends.
    pub concurrency: usize,
}

impl EmailConfig {
    /// Create a configuration for a host and sender address.
    pub fn new(host: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 587,
            security: SmtpSecurity::StartTls,
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
            pool_size: MAX_POOL_SIZE,
            sender: sender.into(),
            rate_per_second: 10,
            concurrency: 3,
        }
    }

    /// Set credentials.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use STARTTLS security (port 587).
    pub fn starttls(mut self) -> Self {
        self.security = SmtpSecurity::StartTls;
        self.port = 587;
        self
    }

    /// Use implicit TLS security (port 465).
    pub fn tls(mut self) -> Self {
        self.security = SmtpSecurity::Tls;
        self.port = 465;
        self
    }

    /// Use no encryption (not recommended).
    pub fn insecure(mut self) -> Self {
        self.security = SmtpSecurity::None;
        self.port = 25;
        self
    }

    /// Set the connection timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
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

struct EmailInner {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    limiter: Arc<MinTimeLimiter>,
    concurrency: usize,
}

/// Transactional email channel.
pub struct EmailChannel {
    inner: Arc<EmailInner>,
}

impl EmailChannel {
    /// Create the channel and its pooled SMTP transport.
    ///
    /// The transport connects lazily; construction fails only on
    /// configuration problems.
    pub fn new(config: EmailConfig) -> Result<Self> {
        let sender: Mailbox = config
            .sender
            .parse()
            .map_err(|e| ChannelError::Config(format!("invalid sender address: {}", e)))?;

        let mut builder = match config.security {
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                    .map_err(|e| ChannelError::Config(e.to_string()))?
            }
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| ChannelError::Config(e.to_string()))?,
        };

        builder = builder
            .port(config.port)
            .timeout(Some(config.timeout))
            .pool_config(PoolConfig::new().max_size(config.pool_size.min(MAX_POOL_SIZE)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let limiter = MinTimeLimiter::per_second(config.concurrency, config.rate_per_second)
            .map_err(|e| ChannelError::Config(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(EmailInner {
                transport: builder.build(),
                sender,
                limiter: Arc::new(limiter),
                concurrency: config.concurrency,
            }),
        })
    }
}

/// Stable code for an SMTP transport error.
fn smtp_error_code(err: &lettre::transport::smtp::Error) -> String {
    if let Some(code) = err.status() {
        code.to_string()
    } else if err.is_timeout() {
        "ETIMEDOUT".to_string()
    } else {
        "ECONNECTION".to_string()
    }
}

async fn send_one(inner: Arc<EmailInner>, recipient: String, meta: EmailMeta) -> SendOutcome {
    let Some(subject) = meta.subject else {
        return SendOutcome::failure(recipient, "MISSING_SUBJECT");
    };

    let mailbox: Mailbox = match recipient.parse() {
        Ok(mailbox) => mailbox,
        Err(e) => {
            return SendOutcome::failure(
                &recipient,
                sanitize_error_key("EENVELOPE", &e.to_string()),
            );
        }
    };

    let message_id = format!("<{}@herald>", Uuid::new_v4());
    let builder = Message::builder()
        .from(inner.sender.clone())
        .to(mailbox)
        .subject(subject)
        .message_id(Some(message_id.clone()));

    // html wins over text; the two are never sent together
    let body = match (meta.html, meta.text) {
        (Some(html), _) => SinglePart::html(html),
        (None, text) => SinglePart::plain(text.unwrap_or_default()),
    };

    let message = if meta.attachments.is_empty() {
        builder.singlepart(body)
    } else {
        let mut multipart = MultiPart::mixed().singlepart(body);
        for attachment in &meta.attachments {
            let content = match BASE64.decode(&attachment.content) {
                Ok(bytes) => bytes,
                Err(e) => {
                    return SendOutcome::failure(
                        &recipient,
                        sanitize_error_key("EATTACHMENT", &e.to_string()),
                    );
                }
            };
            let declared = attachment
                .content_type
                .as_deref()
                .unwrap_or("application/octet-stream");
            let content_type = ContentType::parse(declared).unwrap_or(ContentType::TEXT_PLAIN);
            multipart = multipart
                .singlepart(Attachment::new(attachment.filename.clone()).body(content, content_type));
        }
        builder.multipart(multipart)
    };

    let message = match message {
        Ok(message) => message,
        Err(e) => {
            return SendOutcome::failure(&recipient, sanitize_error_key("EMESSAGE", &e.to_string()));
        }
    };

    match inner.transport.send(message).await {
        Ok(_) => SendOutcome::success(
            &recipient,
            json!({
                "message_id": message_id,
                "accepted": [recipient],
                "rejected": [],
            }),
        ),
        Err(e) => SendOutcome::failure(
            &recipient,
            sanitize_error_key(&smtp_error_code(&e), &e.to_string()),
        ),
    }
}

#[async_trait]
impl ChannelAdapter for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, recipients: &[String], metas: &[MessageMeta]) -> Vec<SendOutcome> {
        let limiter = self.inner.limiter.clone();
        let inner = self.inner.clone();

        send_batch(
            ChannelKind::Email,
            recipients,
            metas,
            &limiter,
            self.inner.concurrency,
            move |_i, recipient, meta| {
                let inner = inner.clone();
                async move {
                    let MessageMeta::Email(meta) = meta else {
                        return SendOutcome::failure(recipient, "Missing meta for recipient");
                    };
                    send_one(inner, recipient, meta).await
                }
            },
        )
        .await
    }
}
