//! Email forwarding channel — SMTP via lettre.
//!
//! Delivery is not idempotent: a retry after a transient failure may cause a
//! duplicate email. Accepted tradeoff for at-least-once forwarding.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use crate::config::EmailConfig;
use crate::error::ChannelError;
use crate::pipeline::types::SmsMessage;

/// SMTP transport timeout. A hung connection must not stall a sweep.
const SMTP_TIMEOUT: Duration = Duration::from_secs(15);

// ── Channel trait ───────────────────────────────────────────────────

/// Email delivery seam.
///
/// Callers must not invoke `send` with an empty destination set — an empty
/// set is a caller error, reported without attempting a connection.
#[async_trait]
pub trait EmailChannel: Send + Sync {
    async fn send(
        &self,
        to: &[String],
        subject: &str,
        body: &str,
        config: &EmailConfig,
    ) -> Result<(), ChannelError>;
}

// ── Message template ────────────────────────────────────────────────

/// Subject line for a forwarded SMS.
pub fn forward_subject(message: &SmsMessage) -> String {
    format!("SMS forwarding: {}", message.sender)
}

/// Body for a forwarded SMS. Fixed template, date as `dd.MM.yyyy HH:mm:ss`.
pub fn forward_body(message: &SmsMessage) -> String {
    format!(
        "Sender: {}\nDate: {}\n\nMessage:\n{}\n\nThis email was automatically sent by the gateway app.\n",
        message.sender,
        message.received_at.format("%d.%m.%Y %H:%M:%S"),
        message.body,
    )
}

// ── SMTP implementation ─────────────────────────────────────────────

/// Production email channel backed by a blocking lettre `SmtpTransport`.
///
/// The transport is rebuilt per send because the SMTP configuration lives in
/// the store and can change between sends. The blocking I/O runs under
/// `spawn_blocking` so it never occupies an async worker thread.
#[derive(Debug, Default)]
pub struct SmtpChannel;

impl SmtpChannel {
    pub fn new() -> Self {
        Self
    }

    fn send_blocking(
        to: &[String],
        subject: &str,
        body: &str,
        config: &EmailConfig,
    ) -> Result<(), ChannelError> {
        let relay = if config.use_ssl {
            SmtpTransport::relay(&config.smtp_server)
        } else {
            SmtpTransport::starttls_relay(&config.smtp_server)
        }
        .map_err(|e| ChannelError::SendFailed {
            name: "email".into(),
            reason: format!("SMTP relay error: {e}"),
        })?;

        let transport = relay
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e| ChannelError::SendFailed {
                name: "email".into(),
                reason: format!("Invalid from address: {e}"),
            })?;

        let mut builder = Message::builder().from(from).subject(subject);
        for recipient in to {
            let mailbox: Mailbox = recipient
                .parse()
                .map_err(|_| ChannelError::InvalidDestination(recipient.clone()))?;
            builder = builder.to(mailbox);
        }

        let email = builder
            .body(body.to_string())
            .map_err(|e| ChannelError::SendFailed {
                name: "email".into(),
                reason: format!("Failed to build email: {e}"),
            })?;

        transport
            .send(&email)
            .map_err(|e| ChannelError::SendFailed {
                name: "email".into(),
                reason: format!("SMTP send failed: {e}"),
            })?;

        Ok(())
    }
}

#[async_trait]
impl EmailChannel for SmtpChannel {
    async fn send(
        &self,
        to: &[String],
        subject: &str,
        body: &str,
        config: &EmailConfig,
    ) -> Result<(), ChannelError> {
        if to.is_empty() {
            return Err(ChannelError::SendFailed {
                name: "email".into(),
                reason: "empty destination set".into(),
            });
        }

        let to = to.to_vec();
        let subject = subject.to_string();
        let body = body.to_string();
        let config = config.clone();
        let smtp_server = config.smtp_server.clone();

        let result = tokio::task::spawn_blocking(move || {
            Self::send_blocking(&to, &subject, &body, &config)
        })
        .await
        .map_err(|e| ChannelError::SendFailed {
            name: "email".into(),
            reason: format!("send task panicked: {e}"),
        })?;

        if result.is_ok() {
            tracing::info!("Email forwarded via {smtp_server}");
        }
        result
    }
}

// ── Tests ───────────────────────────────────────────────────────────
