//! LINE Messaging API channel adapter.
//!
//! Inbound: validates the `X-Line-Signature` header (base64 HMAC-SHA256 of the
//! raw body keyed by the channel secret) and turns the webhook payload into
//! [`InboundEvent`]s. Only text messages are kept; every other event maps to
//! `None` so callers can answer the batch position by position.
//!
//! Outbound: answers an event through the reply endpoint using its reply token.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chatbridge_core::channel::{InboundEvent, ReplyChannel};
use chatbridge_core::error::ChannelError;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// LINE channel configuration.
#[derive(Clone)]
pub struct LineChannelConfig {
    /// Long-lived channel access token used for replies.
    pub channel_access_token: Option<String>,
    /// Channel secret used to validate webhook signatures. `None` = no validation.
    pub channel_secret: Option<String>,
    /// API base URL (`https://api.line.me`).
    pub api_url: String,
}

impl std::fmt::Debug for LineChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineChannelConfig")
            .field("channel_access_token", &self.channel_access_token.as_ref().map(|_| "[REDACTED]"))
            .field("channel_secret", &self.channel_secret.as_ref().map(|_| "[REDACTED]"))
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl From<&chatbridge_config::LineConfig> for LineChannelConfig {
    fn from(config: &chatbridge_config::LineConfig) -> Self {
        Self {
            channel_access_token: config.channel_access_token.clone(),
            channel_secret: config.channel_secret.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
        }
    }
}

/// LINE channel adapter.
pub struct LineChannel {
    config: LineChannelConfig,
    client: reqwest::Client,
}

impl LineChannel {
    pub fn new(config: LineChannelConfig) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ChannelError::NotConfigured(format!("HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Whether inbound signatures are checked.
    pub fn verifies_signatures(&self) -> bool {
        self.config
            .channel_secret
            .as_deref()
            .is_some_and(|s| !s.is_empty())
    }

    /// Validate a base64 HMAC-SHA256 signature against the channel secret.
    ///
    /// Uses constant-time comparison via `verify_slice`.
    pub fn validate_signature(&self, body: &[u8], signature: Option<&str>) -> bool {
        let secret = match self.config.channel_secret.as_deref() {
            None | Some("") => return true,
            Some(secret) => secret,
        };

        let Some(signature) = signature else {
            return false;
        };

        let provided = match BASE64.decode(signature.trim()) {
            Ok(b) => b,
            Err(_) => return false,
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(body);
        mac.verify_slice(&provided).is_ok()
    }

    /// Like [`validate_signature`](Self::validate_signature), as a `Result`.
    pub fn verify(&self, body: &[u8], signature: Option<&str>) -> Result<(), ChannelError> {
        if self.validate_signature(body, signature) {
            Ok(())
        } else {
            Err(ChannelError::InvalidSignature)
        }
    }

    /// Parse a webhook body into one slot per event.
    ///
    /// A body that is not a JSON object with an `events` array is an error.
    /// Individual events that are not text messages, or lack a user id,
    /// reply token, or text, become `None`.
    pub fn parse_events(body: &[u8]) -> Result<Vec<Option<InboundEvent>>, ChannelError> {
        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;

        let events: Vec<Option<InboundEvent>> = payload
            .events
            .into_iter()
            .map(|raw| match serde_json::from_value::<RawEvent>(raw) {
                Ok(event) => event.into_inbound(),
                Err(e) => {
                    debug!(error = %e, "Skipping unrecognised webhook event");
                    None
                }
            })
            .collect();

        debug!(
            total = events.len(),
            text = events.iter().filter(|e| e.is_some()).count(),
            "Parsed webhook events"
        );
        Ok(events)
    }
}

/// Compute the signature LINE would send for `body`.
pub fn sign(secret: &str, body: &[u8]) -> String {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            BASE64.encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

#[async_trait]
impl ReplyChannel for LineChannel {
    fn name(&self) -> &str {
        "line"
    }

    async fn reply(&self, reply_handle: &str, text: &str) -> Result<(), ChannelError> {
        let token = self
            .config
            .channel_access_token
            .as_deref()
            .ok_or_else(|| ChannelError::NotConfigured("LINE channel access token".into()))?;

        let url = format!("{}/v2/bot/message/reply", self.config.api_url);
        let body = ReplyRequest {
            reply_token: reply_handle,
            messages: vec![TextMessage {
                kind: "text",
                text,
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "LINE reply rejected");
            return Err(ChannelError::DeliveryFailed(format!(
                "status {status}: {error_body}"
            )));
        }

        debug!(text_len = text.len(), "LINE reply sent");
        Ok(())
    }
}

// --- LINE API types (internal) ---

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    events: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    reply_token: Option<String>,
    #[serde(default)]
    source: Option<RawSource>,
    #[serde(default)]
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSource {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl RawEvent {
    fn into_inbound(self) -> Option<InboundEvent> {
        if self.kind != "message" {
            return None;
        }
        let message = self.message?;
        if message.kind != "text" {
            return None;
        }
        let text = message.text.filter(|t| !t.trim().is_empty())?;
        let user_id = self.source?.user_id.filter(|u| !u.is_empty())?;
        let reply_handle = self.reply_token.filter(|t| !t.is_empty())?;
        Some(InboundEvent {
            user_id,
            text,
            reply_handle,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}
