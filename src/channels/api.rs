//! HTTP API forwarding channel — one POST per message via reqwest.
//!
//! Wire format: request `{phoneNumber, message, senderName?, timestamp}`,
//! response `{success, message, data?}`; HTTP 200 is the only success
//! status. No retry inside the channel — the periodic sweep is the retry
//! mechanism.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::pipeline::types::SmsMessage;

/// Connect and request timeout for API calls.
const API_TIMEOUT: Duration = Duration::from_secs(15);

// ── Wire types ──────────────────────────────────────────────────────

/// Request payload for the API sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsRequest {
    pub phone_number: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Epoch milliseconds of the send attempt.
    pub timestamp: i64,
}

/// Response payload from the API sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

// ── Channel trait ───────────────────────────────────────────────────

/// API delivery seam.
///
/// The caller is responsible for the enablement check; this channel only
/// validates that the endpoint is non-blank.
#[async_trait]
pub trait ApiChannel: Send + Sync {
    async fn send(
        &self,
        endpoint: &str,
        message: &SmsMessage,
        sender_name: Option<&str>,
        auth_token: Option<&str>,
    ) -> Result<ApiResponse, ChannelError>;
}

// ── HTTP implementation ─────────────────────────────────────────────

/// Production API channel backed by a shared reqwest client.
pub struct HttpApiChannel {
    client: reqwest::Client,
}

impl HttpApiChannel {
    pub fn new() -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .connect_timeout(API_TIMEOUT)
            .build()
            .map_err(|e| ChannelError::SendFailed {
                name: "api".into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ApiChannel for HttpApiChannel {
    async fn send(
        &self,
        endpoint: &str,
        message: &SmsMessage,
        sender_name: Option<&str>,
        auth_token: Option<&str>,
    ) -> Result<ApiResponse, ChannelError> {
        if endpoint.trim().is_empty() {
            return Err(ChannelError::NotConfigured {
                name: "api".into(),
                reason: "endpoint URL is blank".into(),
            });
        }

        let payload = SmsRequest {
            phone_number: message.sender.clone(),
            message: message.body.clone(),
            sender_name: sender_name.map(str::to_string),
            timestamp: Utc::now().timestamp_millis(),
        };

        let mut request = self.client.post(endpoint).json(&payload);
        if let Some(token) = auth_token.filter(|t| !t.trim().is_empty()) {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ChannelError::Timeout { name: "api".into() }
            } else {
                ChannelError::SendFailed {
                    name: "api".into(),
                    reason: format!("HTTP request failed: {e}"),
                }
            }
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ChannelError::HttpStatus {
                code: status.as_u16(),
                reason: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        let body: ApiResponse =
            response
                .json()
                .await
                .map_err(|e| ChannelError::SendFailed {
                    name: "api".into(),
                    reason: format!("Invalid response body: {e}"),
                })?;

        tracing::debug!(endpoint, api_message = %body.message, "API accepted message");
        Ok(body)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
