//! Outbound delivery through the WhatsApp Cloud API.
//!
//! [`WhatsAppClient`] performs exactly one `POST .../messages` per call and
//! classifies the outcome:
//!
//! - HTTP 200 → [`Acknowledgment`]
//! - any other status → [`Error::DispatchRejected`]
//! - no response at all → [`Error::DispatchTransport`]
//!
//! Retrying is left to the caller. The relay never retries; the next poll
//! cycle only sees messages that were not yet marked seen.

use crate::config::WhatsAppConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Sends a text message to a phone number.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Delivers `body` to `destination` in a single attempt.
    async fn send(&self, destination: &str, body: &str) -> Result<Acknowledgment>;
}

/// Strips spaces, hyphens and parentheses and makes sure the number starts
/// with `+`.
///
/// ```
/// use mail_relay::dispatcher::normalize_phone_number;
///
/// assert_eq!(normalize_phone_number("(555) 123-4567"), "+5551234567");
/// assert_eq!(normalize_phone_number("+1 555 123 4567"), "+15551234567");
/// ```
#[must_use]
pub fn normalize_phone_number(phone: &str) -> String {
    let digits: String = phone
        .chars()
        .filter(|c| !(c.is_whitespace() || matches!(c, '-' | '(' | ')')))
        .collect();

    if digits.starts_with('+') {
        digits
    } else {
        format!("+{digits}")
    }
}

/// Request body of the send-message endpoint for a plain text message.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TextMessage<'a> {
    messaging_product: &'static str,
    recipient_type: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
struct TextBody<'a> {
    preview_url: bool,
    body: &'a str,
}

impl<'a> TextMessage<'a> {
    /// Builds an individual-recipient text message with link previews off.
    #[must_use]
    pub fn new(to: &'a str, body: &'a str) -> Self {
        Self {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to,
            kind: "text",
            text: TextBody {
                preview_url: false,
                body,
            },
        }
    }
}

/// Parsed success response of the send-message endpoint.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Acknowledgment {
    /// Echo of the product, normally `whatsapp`.
    #[serde(default)]
    pub messaging_product: Option<String>,
    /// Recipients as resolved by the provider.
    #[serde(default)]
    pub contacts: Vec<AckContact>,
    /// Provider-assigned message identifiers.
    #[serde(default)]
    pub messages: Vec<AckMessage>,
}

/// Recipient entry of an [`Acknowledgment`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AckContact {
    /// Number as sent.
    #[serde(default)]
    pub input: String,
    /// WhatsApp ID of the recipient.
    #[serde(default)]
    pub wa_id: String,
}

/// Message entry of an [`Acknowledgment`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AckMessage {
    /// Provider message id (`wamid....`).
    #[serde(default)]
    pub id: String,
}

impl Acknowledgment {
    /// Identifier of the first accepted message.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.messages.first().map(|m| m.id.as_str())
    }
}

/// [`Notifier`] for the WhatsApp Cloud API.
#[derive(Debug, Clone)]
pub struct WhatsAppClient {
    http: reqwest::Client,
    config: WhatsAppConfig,
}

impl WhatsAppClient {
    /// Creates a client whose requests time out after `config.request_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(config: WhatsAppConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::InvalidConfig {
                message: format!("cannot build HTTP client: {e}"),
            })?;

        Ok(Self { http, config })
    }

    /// The endpoint every message is posted to.
    #[must_use]
    pub fn endpoint(&self) -> String {
        self.config.messages_url()
    }
}

#[async_trait]
impl Notifier for WhatsAppClient {
    #[instrument(name = "dispatcher::send", skip(self, body), fields(to = %destination))]
    async fn send(&self, destination: &str, body: &str) -> Result<Acknowledgment> {
        let url = self.endpoint();
        debug!(url = %url, body_len = body.len(), "Posting message");

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.config.access_token())
            .json(&TextMessage::new(destination, body))
            .send()
            .await
            .map_err(|source| Error::DispatchTransport {
                destination: destination.to_string(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let detail = response.text().await.unwrap_or_default();
            let reason = match status.canonical_reason() {
                Some(phrase) if detail.is_empty() => phrase.to_string(),
                Some(phrase) => format!("{phrase}: {detail}"),
                None => detail,
            };
            return Err(Error::DispatchRejected {
                destination: destination.to_string(),
                status: status.as_u16(),
                reason,
            });
        }

        let ack: Acknowledgment = response
            .json()
            .await
            .map_err(|source| Error::DispatchResponse { source })?;

        info!(
            to = %destination,
            message_id = ack.message_id().unwrap_or_default(),
            "Message accepted by WhatsApp"
        );
        Ok(ack)
    }
}
