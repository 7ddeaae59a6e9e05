//! Inbound webhook envelope from the WhatsApp Cloud API.
//!
//! Only the fields the bot reads are modelled; everything else is ignored.

use serde::Deserialize;

/// Top-level webhook body: entries → changes → value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Change {
    /// `messages` for inbound traffic; status callbacks use other fields.
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: ChangeValue,
}

impl Change {
    pub fn carries_messages(&self) -> bool {
        self.field.as_deref().is_none_or(|f| f == "messages")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messaging_product: Option<String>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
}

impl ChangeValue {
    /// Profile name the sender shared, if any.
    pub fn contact_name(&self, wa_id: &str) -> Option<&str> {
        self.contacts
            .iter()
            .find(|c| c.wa_id.as_deref() == Some(wa_id))
            .and_then(|c| c.profile.as_ref())
            .map(|p| p.name.trim())
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub profile: Option<ContactProfile>,
    #[serde(default)]
    pub wa_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactProfile {
    #[serde(default)]
    pub name: String,
}

/// One inbound message; `kind` is selected by its `type` field.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub kind: MessageKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Text {
        #[serde(default)]
        text: Option<TextContent>,
    },
    Image {
        #[serde(default)]
        image: Option<MediaContent>,
    },
    Audio {
        #[serde(default)]
        audio: Option<MediaContent>,
    },
    Video {
        #[serde(default)]
        video: Option<MediaContent>,
    },
    Document {
        #[serde(default)]
        document: Option<MediaContent>,
    },
    Location {
        #[serde(default)]
        location: Option<serde_json::Value>,
    },
    /// Any type the bot does not read.
    #[serde(other)]
    Unsupported,
}

impl MessageKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Audio { .. } => "audio",
            Self::Video { .. } => "video",
            Self::Document { .. } => "document",
            Self::Location { .. } => "location",
            Self::Unsupported => "unsupported",
        }
    }

    /// Non-empty text body, if this is a text message.
    pub fn text_body(&self) -> Option<&str> {
        match self {
            Self::Text { text: Some(t) } if !t.body.trim().is_empty() => Some(&t.body),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaContent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
      "object": "whatsapp_business_account",
      "entry": [{
        "id": "WABA_ID",
        "changes": [{
          "field": "messages",
          "value": {
            "messaging_product": "whatsapp",
            "metadata": {"display_phone_number": "15550000000", "phone_number_id": "123"},
            "contacts": [{"profile": {"name": "Asha"}, "wa_id": "15550001111"}],
            "messages": [
              {"from": "15550001111", "id": "wamid.1", "timestamp": "1700000000",
               "type": "text", "text": {"body": "Hi there"}},
              {"from": "15550001111", "id": "wamid.2", "timestamp": "1700000001",
               "type": "image", "image": {"id": "img1", "mime_type": "image/jpeg", "sha256": "x"}},
              {"from": "15550001111", "id": "wamid.3", "type": "sticker", "sticker": {"id": "s"}}
            ]
          }
        }]
      }]
    }"#;

    #[test]
    fn parses_mixed_message_kinds() {
        let env: WebhookEnvelope = serde_json::from_str(SAMPLE).unwrap();
        let value = &env.entry[0].changes[0].value;
        assert_eq!(value.messages.len(), 3);

        assert_eq!(value.messages[0].kind.text_body(), Some("Hi there"));
        assert_eq!(value.messages[1].kind.label(), "image");
        assert!(value.messages[1].kind.text_body().is_none());
        assert_eq!(value.messages[2].kind.label(), "unsupported");
        assert_eq!(value.contact_name("15550001111"), Some("Asha"));
        assert_eq!(value.contact_name("0000"), None);
    }

    #[test]
    fn status_callbacks_carry_no_messages() {
        let env: WebhookEnvelope = serde_json::from_str(
            r#"{"entry":[{"changes":[{"field":"statuses","value":{"statuses":[{"id":"x"}]}}]}]}"#,
        )
        .unwrap();
        let change = &env.entry[0].changes[0];
        assert!(!change.carries_messages());
        assert!(change.value.messages.is_empty());
    }

    #[test]
    fn missing_field_counts_as_messages() {
        let change = Change::default();
        assert!(change.carries_messages());
    }

    #[test]
    fn blank_text_has_no_body() {
        let kind: MessageKind =
            serde_json::from_str(r#"{"type":"text","text":{"body":"   "}}"#).unwrap();
        assert!(kind.text_body().is_none());
    }

    #[test]
    fn empty_object_is_a_valid_envelope() {
        let env: WebhookEnvelope = serde_json::from_str("{}").unwrap();
        assert!(env.entry.is_empty());
        assert!(serde_json::from_str::<WebhookEnvelope>("not json").is_err());
    }
}
