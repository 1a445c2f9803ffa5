//! Inbound webhook verification and event parsing.
//!
//! The signature check is the trust boundary against an external network
//! caller, so the comparison is constant-time. Verification happens over the
//! raw body bytes, before any JSON parsing.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook signature mismatch")]
    SignatureMismatch,
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
}

/// Verify the hex HMAC-SHA256 signature of a raw request body.
///
/// No configured secret means verification is disabled and every payload is
/// accepted; a documented non-default state the caller is expected to log as
/// an operational risk.
pub fn verify_signature(
    secret: Option<&str>,
    body: &[u8],
    signature: Option<&str>,
) -> Result<(), WebhookError> {
    let Some(secret) = secret else {
        return Ok(());
    };

    let Some(signature) = signature else {
        return Err(WebhookError::SignatureMismatch);
    };

    let provided = hex::decode(signature.trim()).map_err(|_| WebhookError::SignatureMismatch)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::SignatureMismatch)?;
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    if expected.ct_eq(provided.as_slice()).unwrap_u8() == 0 {
        return Err(WebhookError::SignatureMismatch);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookEventKind {
    PostPublished,
    PostUpdated,
    PostDeleted,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventData {
    pub post_id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub published_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    pub event: WebhookEventKind,
    pub data: WebhookEventData,
}

impl WebhookEnvelope {
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body).map_err(|err| WebhookError::InvalidPayload(err.to_string()))
    }

    /// Remote-side timestamp of the event, falling back to receipt time when
    /// the payload carries none.
    pub fn occurred_at(&self, received_at: OffsetDateTime) -> OffsetDateTime {
        self.data
            .published_at
            .as_deref()
            .and_then(|raw| OffsetDateTime::parse(raw, &Rfc3339).ok())
            .unwrap_or(received_at)
    }
}
