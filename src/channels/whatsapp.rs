//! WhatsApp channel: posts messages to the Cloud (Graph) API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, warn};

use crate::channels::{Messenger, OutboundPayload};
use crate::config::MessagingConfig;
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "whatsapp";

/// WhatsApp Cloud API client. One request per send, no retries.
pub struct WhatsAppClient {
    access_token: SecretString,
    phone_number_id: String,
    api_base: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(flatten)]
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Content<'a> {
    Text { text: TextBody<'a> },
    Template { template: TemplateBody<'a> },
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct TemplateBody<'a> {
    name: &'a str,
    language: LanguageCode<'a>,
}

#[derive(Debug, Serialize)]
struct LanguageCode<'a> {
    code: &'a str,
}

impl WhatsAppClient {
    pub fn new(config: &MessagingConfig) -> Self {
        Self {
            access_token: SecretString::from(config.access_token.expose_secret().to_string()),
            phone_number_id: config.phone_number_id.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_number_id)
    }
}

fn request_body(to: &str, payload: &OutboundPayload) -> serde_json::Result<serde_json::Value> {
    let content = match payload {
        OutboundPayload::Text { body } => Content::Text {
            text: TextBody { body },
        },
        OutboundPayload::Template { name, language } => Content::Template {
            template: TemplateBody {
                name,
                language: LanguageCode { code: language },
            },
        },
    };
    serde_json::to_value(SendRequest {
        messaging_product: "whatsapp",
        to,
        content,
    })
}

#[async_trait]
impl Messenger for WhatsAppClient {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn send(&self, to: &str, payload: OutboundPayload) -> Result<(), ChannelError> {
        let body = request_body(to, &payload).map_err(|e| ChannelError::SendFailed {
            name: CHANNEL_NAME.into(),
            reason: e.to_string(),
        })?;

        let resp = self
            .client
            .post(self.api_url())
            .bearer_auth(self.access_token.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: CHANNEL_NAME.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), to, detail = %detail, "WhatsApp send rejected");
            return Err(ChannelError::Rejected {
                name: CHANNEL_NAME.into(),
                status: status.as_u16(),
            });
        }

        debug!(to, "WhatsApp message sent");
        Ok(())
    }
}
