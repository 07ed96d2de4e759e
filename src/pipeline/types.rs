//! Shared types for the forwarding pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── SMS message ─────────────────────────────────────────────────────

/// An SMS message mirrored from the platform inbox.
///
/// `id` is the platform-native identifier and stays stable across
/// reconciliation sweeps. The forward-status fields are mutated only by the
/// processor after a successful email delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsMessage {
    /// Platform-native unique identifier.
    pub id: String,
    /// Originating phone number or alphanumeric sender.
    pub sender: String,
    /// Message text.
    pub body: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
    /// Read flag from the platform inbox. Informational only.
    pub is_read: bool,
    /// Platform message type tag (1 = inbox, 2 = sent). Informational only.
    pub kind: i64,
    /// Whether this message has been forwarded by email.
    pub forwarded: bool,
    /// Email addresses the message was forwarded to. Empty unless forwarded.
    pub forwarded_to: Vec<String>,
    /// When the email forward succeeded. Set iff `forwarded`.
    pub forwarded_at: Option<DateTime<Utc>>,
    /// When the API delivery succeeded. Tracked separately so an API-only
    /// success is not re-sent on every subsequent sweep.
    pub api_forwarded_at: Option<DateTime<Utc>>,
}

impl SmsMessage {
    /// Build a freshly captured, not-yet-forwarded message.
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        body: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            body: body.into(),
            received_at,
            is_read: false,
            kind: 1,
            forwarded: false,
            forwarded_to: Vec::new(),
            forwarded_at: None,
            api_forwarded_at: None,
        }
    }
}

// ── Forward result ──────────────────────────────────────────────────

/// Outcome of one forwarding run for one message.
///
/// Transient — reported to the caller and logged, never persisted. `success`
/// is true iff at least one channel delivered.
#[derive(Debug, Clone)]
pub struct ForwardResult {
    pub success: bool,
    /// Email destinations actually used, empty when the email branch failed.
    pub destinations: Vec<String>,
    /// Human-readable diagnostic; failure reasons from both branches are
    /// concatenated when both fail.
    pub detail: String,
}
