//! ForwardProcessor — the central use case.
//!
//! Takes one message, runs the rule matcher, fans out to the email and API
//! channels, merges the per-channel outcomes into a single [`ForwardResult`],
//! and persists the forward status. Never returns an error: every failure
//! inside a branch is folded into that branch's outcome, and the worst case
//! is a message left unforwarded for the next sweep to retry.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::channels::email::{forward_body, forward_subject};
use crate::channels::{ApiChannel, EmailChannel};
use crate::pipeline::rules::{apply_rules, collect_destinations};
use crate::pipeline::types::{ForwardResult, SmsMessage};
use crate::store::Database;

/// Outcome of one delivery branch.
enum BranchOutcome {
    Delivered(String),
    Failed(String),
}

impl BranchOutcome {
    fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    fn detail(&self) -> &str {
        match self {
            Self::Delivered(s) | Self::Failed(s) => s,
        }
    }
}

/// Orchestrates filtering and fan-out for one message at a time.
pub struct ForwardProcessor {
    store: Arc<dyn Database>,
    email: Arc<dyn EmailChannel>,
    api: Arc<dyn ApiChannel>,
}

impl ForwardProcessor {
    pub fn new(
        store: Arc<dyn Database>,
        email: Arc<dyn EmailChannel>,
        api: Arc<dyn ApiChannel>,
    ) -> Self {
        Self { store, email, api }
    }

    /// Process one message: match rules, forward, persist status.
    ///
    /// The two branches are independent — an email failure never prevents
    /// the API attempt and vice versa. Overall success means at least one
    /// branch delivered.
    pub async fn process(&self, message: &SmsMessage) -> ForwardResult {
        let (email_outcome, destinations) = self.run_email_branch(message).await;
        let api_outcome = self.run_api_branch(message).await;

        let success = email_outcome.is_delivered() || api_outcome.is_delivered();
        let detail = format!(
            "email: {}; api: {}",
            email_outcome.detail(),
            api_outcome.detail()
        );

        if success {
            info!(message_id = %message.id, %detail, "Message forwarded");
        } else {
            warn!(message_id = %message.id, %detail, "Message not forwarded");
        }

        ForwardResult {
            success,
            destinations: if email_outcome.is_delivered() {
                destinations
            } else {
                Vec::new()
            },
            detail,
        }
    }

    /// Email branch: rules → destination union → SMTP send → status update.
    ///
    /// The forward status flips to forwarded only on a successful send; a
    /// match with zero destinations never invokes the channel and never
    /// marks the message forwarded.
    async fn run_email_branch(&self, message: &SmsMessage) -> (BranchOutcome, Vec<String>) {
        let rules = match self.store.list_enabled_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                return (
                    BranchOutcome::Failed(format!("failed to load filter rules: {e}")),
                    Vec::new(),
                );
            }
        };

        let matches = apply_rules(message, &rules);
        if matches.is_empty() {
            return (
                BranchOutcome::Failed("no filter rules matched".into()),
                Vec::new(),
            );
        }

        let destinations = collect_destinations(&matches);
        if destinations.is_empty() {
            return (
                BranchOutcome::Failed("matched rules have no destinations".into()),
                Vec::new(),
            );
        }

        let config = match self.store.get_email_config().await {
            Ok(Some(config)) => config,
            Ok(None) => {
                return (
                    BranchOutcome::Failed("email configuration not found".into()),
                    Vec::new(),
                );
            }
            Err(e) => {
                return (
                    BranchOutcome::Failed(format!("failed to load email configuration: {e}")),
                    Vec::new(),
                );
            }
        };

        let subject = forward_subject(message);
        let body = forward_body(message);
        if let Err(e) = self
            .email
            .send(&destinations, &subject, &body, &config)
            .await
        {
            return (BranchOutcome::Failed(e.to_string()), Vec::new());
        }

        // Delivery already happened, so a status-write failure here cannot
        // be rolled back; the next sweep may re-send (accepted at-least-once
        // tradeoff).
        if let Err(e) = self
            .store
            .update_forward_status(&message.id, true, &destinations, Some(Utc::now()))
            .await
        {
            return (
                BranchOutcome::Failed(format!("email sent but status update failed: {e}")),
                Vec::new(),
            );
        }

        (
            BranchOutcome::Delivered(format!("delivered to {} address(es)", destinations.len())),
            destinations,
        )
    }

    /// API branch: config check → HTTP POST → per-channel delivery record.
    ///
    /// A message already delivered to the API is skipped without a resend,
    /// so API-only successes do not repeat on every future sweep.
    async fn run_api_branch(&self, message: &SmsMessage) -> BranchOutcome {
        let config = match self.store.get_api_config().await {
            Ok(Some(config)) => config,
            Ok(None) => {
                return BranchOutcome::Failed("API integration is not configured".into());
            }
            Err(e) => {
                return BranchOutcome::Failed(format!("failed to load API configuration: {e}"));
            }
        };

        if !config.enabled || config.api_url.trim().is_empty() {
            return BranchOutcome::Failed("API integration is not configured".into());
        }

        if message.api_forwarded_at.is_some() {
            debug!(message_id = %message.id, "API delivery already recorded, skipping resend");
            return BranchOutcome::Delivered("already delivered".into());
        }

        let sender_name =
            Some(config.custom_sender_name.as_str()).filter(|name| !name.trim().is_empty());
        let auth_token = Some(config.auth_token.as_str()).filter(|token| !token.trim().is_empty());

        let response = match self
            .api
            .send(&config.api_url, message, sender_name, auth_token)
            .await
        {
            Ok(response) => response,
            Err(e) => return BranchOutcome::Failed(e.to_string()),
        };

        if let Err(e) = self.store.mark_api_forwarded(&message.id, Utc::now()).await {
            return BranchOutcome::Failed(format!(
                "API accepted message but status update failed: {e}"
            ));
        }

        BranchOutcome::Delivered(format!("accepted ({})", response.message))
    }
}

// ── Tests ───────────────────────────────────────────────────────────
