//! Configuration types — SMTP, API sink, and gateway runtime settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ── Email (SMTP) configuration ──────────────────────────────────────

/// SMTP configuration for the email forwarding channel.
///
/// Persisted as a singleton row in the config store; may be seeded from
/// environment variables on first start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    /// Implicit TLS (SMTPS, typically port 465) when true; STARTTLS otherwise.
    pub use_ssl: bool,
}

impl EmailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMS_GW_SMTP_SERVER` is not set.
    pub fn from_env() -> Option<Self> {
        let smtp_server = std::env::var("SMS_GW_SMTP_SERVER").ok()?;

        let smtp_port: u16 = std::env::var("SMS_GW_SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(465);

        let username = std::env::var("SMS_GW_SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("SMS_GW_SMTP_PASSWORD").unwrap_or_default();
        let from_address =
            std::env::var("SMS_GW_SMTP_FROM").unwrap_or_else(|_| username.clone());

        let use_ssl = std::env::var("SMS_GW_SMTP_USE_SSL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        Some(Self {
            smtp_server,
            smtp_port,
            username,
            password,
            from_address,
            use_ssl,
        })
    }
}

// ── API sink configuration ──────────────────────────────────────────

/// HTTP API sink configuration.
///
/// `enabled = false` (the default) disables the API branch entirely.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub api_url: String,
    /// Sent as a bearer token when non-empty.
    pub auth_token: String,
    /// Overrides the sender name in API payloads when non-empty.
    pub custom_sender_name: String,
}

impl ApiConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMS_GW_API_URL` is not set.
    pub fn from_env() -> Option<Self> {
        let api_url = std::env::var("SMS_GW_API_URL").ok()?;
        let enabled = std::env::var("SMS_GW_API_ENABLED")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        Some(Self {
            enabled,
            api_url,
            auth_token: std::env::var("SMS_GW_API_TOKEN").unwrap_or_default(),
            custom_sender_name: std::env::var("SMS_GW_API_SENDER_NAME").unwrap_or_default(),
        })
    }
}

// ── Gateway runtime configuration ───────────────────────────────────

/// Runtime settings for the gateway process.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Path to the local SQLite database file.
    pub db_path: String,
    /// Interval between reconciliation sweeps.
    pub sweep_interval: Duration,
    /// `host:port` probed before each sweep to confirm network reachability.
    pub probe_addr: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            db_path: "./data/sms-gateway.db".to_string(),
            sweep_interval: Duration::from_secs(15 * 60),
            probe_addr: None,
        }
    }
}

impl GatewayConfig {
    /// Build runtime config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let db_path = std::env::var("SMS_GW_DB_PATH").unwrap_or(defaults.db_path);

        let sweep_interval = match std::env::var("SMS_GW_SWEEP_INTERVAL_SECS") {
            Ok(s) => {
                let secs: u64 = s.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "SMS_GW_SWEEP_INTERVAL_SECS".into(),
                    message: format!("not a number: {s}"),
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => defaults.sweep_interval,
        };

        let probe_addr = std::env::var("SMS_GW_PROBE_ADDR").ok();

        Ok(Self {
            db_path,
            sweep_interval,
            probe_addr,
        })
    }
}
