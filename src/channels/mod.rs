//! Outbound messaging: the `Messenger` seam and its WhatsApp implementation.

pub mod replies;
pub mod whatsapp;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ChannelError;

pub use replies::ErrorReply;
pub use whatsapp::WhatsAppClient;

/// What to deliver to a recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundPayload {
    /// Free-form text.
    Text { body: String },
    /// A pre-approved template, addressed by name and language code.
    Template { name: String, language: String },
}

impl OutboundPayload {
    pub fn text(body: impl Into<String>) -> Self {
        Self::Text { body: body.into() }
    }

    pub fn template(name: impl Into<String>, language: impl Into<String>) -> Self {
        Self::Template {
            name: name.into(),
            language: language.into(),
        }
    }
}

/// Trait for outbound transports: pure I/O, no conversation logic.
///
/// Implementations do not retry. Callers log failures and decide whether
/// the surrounding work continues.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Transport name (e.g. "whatsapp").
    fn name(&self) -> &str;

    /// Deliver one payload to a phone number.
    async fn send(&self, to: &str, payload: OutboundPayload) -> Result<(), ChannelError>;

    /// Deliver a text message.
    async fn send_text(&self, to: &str, body: &str) -> Result<(), ChannelError> {
        self.send(to, OutboundPayload::text(body)).await
    }
}
