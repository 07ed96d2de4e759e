//! Unified `Database` trait — single async interface for all persistence.
//!
//! Covers the message mirror, filter rules (including the CRUD surface the
//! configuration UI uses), and the singleton email/API config records.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{ApiConfig, EmailConfig};
use crate::error::DatabaseError;
use crate::pipeline::rules::FilterRule;
use crate::pipeline::types::SmsMessage;

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    // ── Messages ────────────────────────────────────────────────────

    /// Insert a message if no row with the same id exists.
    ///
    /// Returns true when a row was inserted, false when the id was already
    /// present (reconciliation no-op).
    async fn insert_message_if_absent(&self, message: &SmsMessage)
    -> Result<bool, DatabaseError>;

    /// Get a message by id.
    async fn get_message(&self, id: &str) -> Result<Option<SmsMessage>, DatabaseError>;

    /// All messages not yet forwarded by email, oldest first.
    async fn list_unforwarded(&self) -> Result<Vec<SmsMessage>, DatabaseError>;

    /// Most recent messages, up to `limit`.
    async fn list_messages(&self, limit: usize) -> Result<Vec<SmsMessage>, DatabaseError>;

    /// Update a message's email forward status in one write.
    async fn update_forward_status(
        &self,
        id: &str,
        forwarded: bool,
        forwarded_to: &[String],
        forwarded_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError>;

    /// Record a successful API delivery for a message.
    async fn mark_api_forwarded(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError>;

    // ── Filter rules ────────────────────────────────────────────────

    /// All enabled rules, in creation order.
    async fn list_enabled_rules(&self) -> Result<Vec<FilterRule>, DatabaseError>;

    /// All rules regardless of enablement, in creation order.
    async fn list_rules(&self) -> Result<Vec<FilterRule>, DatabaseError>;

    /// Get a rule by id.
    async fn get_rule(&self, id: i64) -> Result<Option<FilterRule>, DatabaseError>;

    /// Insert a rule, returning the assigned id.
    async fn insert_rule(&self, rule: &FilterRule) -> Result<i64, DatabaseError>;

    /// Update an existing rule by its id.
    async fn update_rule(&self, rule: &FilterRule) -> Result<(), DatabaseError>;

    /// Delete a rule by id.
    async fn delete_rule(&self, id: i64) -> Result<(), DatabaseError>;

    // ── Config ──────────────────────────────────────────────────────

    /// The stored SMTP configuration, if any.
    async fn get_email_config(&self) -> Result<Option<EmailConfig>, DatabaseError>;

    /// Save (upsert) the SMTP configuration.
    async fn save_email_config(&self, config: &EmailConfig) -> Result<(), DatabaseError>;

    /// The stored API configuration, if any. Absence is distinct from a
    /// saved-but-disabled configuration.
    async fn get_api_config(&self) -> Result<Option<ApiConfig>, DatabaseError>;

    /// Save (upsert) the API configuration.
    async fn save_api_config(&self, config: &ApiConfig) -> Result<(), DatabaseError>;
}
