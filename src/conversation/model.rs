//! Users and their embedded conversation state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stage of the conversation with one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    #[default]
    New,
    Welcomed,
    WaitingForUrl,
    Processing,
    Completed,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Welcomed => "welcomed",
            Self::WaitingForUrl => "waiting_for_url",
            Self::Processing => "processing",
            Self::Completed => "completed",
        }
    }

    /// Steps in which the bot may be waiting for a profile URL.
    pub fn accepts_url(&self) -> bool {
        matches!(self, Self::Welcomed | Self::WaitingForUrl)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "welcomed" => Ok(Self::Welcomed),
            "waiting_for_url" => Ok(Self::WaitingForUrl),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown step: {other}")),
        }
    }
}

/// The minimal per-user memory needed to interpret the next message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub step: Step,
    pub waiting_for_url: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_catalog_id: Option<String>,
}

impl ConversationState {
    /// `waiting_for_url` only while welcomed or explicitly waiting.
    pub fn is_consistent(&self) -> bool {
        !self.waiting_for_url || self.step.accepts_url()
    }

    /// State after a validated URL has been accepted for processing.
    pub fn start_processing(&mut self, canonical_url: &str) {
        self.step = Step::Processing;
        self.waiting_for_url = false;
        self.pending_url = Some(canonical_url.to_string());
    }

    /// State after a catalog has been built.
    pub fn complete(&mut self, catalog_id: &str) {
        self.step = Step::Completed;
        self.waiting_for_url = false;
        self.pending_url = None;
        self.active_catalog_id = Some(catalog_id.to_string());
    }

    /// State after an ingestion job ended without a catalog, so the next
    /// message is read as a fresh URL attempt.
    pub fn await_retry(&mut self) {
        self.step = Step::WaitingForUrl;
        self.waiting_for_url = true;
        self.pending_url = None;
    }
}

/// A chat user, keyed by phone number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub phone_number: String,
    pub name: String,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A first-contact user. Falls back to the phone number when no
    /// usable contact name is known.
    pub fn new(phone_number: impl Into<String>, name_hint: Option<&str>) -> Self {
        let phone_number = phone_number.into();
        let name = name_hint
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .unwrap_or_else(|| phone_number.clone());
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            phone_number,
            name,
            state: ConversationState::default(),
            created_at: now,
            updated_at: now,
        }
    }
}
