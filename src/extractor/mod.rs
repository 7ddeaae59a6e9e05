//! Profile extraction: fetches a public profile and its recent posts.

pub mod instagram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

pub use instagram::InstagramExtractor;

/// A scraped profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    /// Display name; falls back to the username when the page has none.
    pub display_name: String,
    pub bio: String,
    pub posts: Vec<Post>,
}

impl Profile {
    /// Name shown to the user on completion.
    pub fn business_name(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.username
        } else {
            &self.display_name
        }
    }
}

/// One post on a profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub post_url: String,
    pub caption: String,
    pub images: Vec<String>,
    pub likes: u64,
    pub comments: u64,
    pub hashtags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<String>,
}

/// Source of profile content for the ingestion pipeline.
#[async_trait]
pub trait ProfileExtractor: Send + Sync {
    /// Fetch the profile at a canonical profile URL.
    async fn scrape(&self, profile_url: &str) -> Result<Profile, ExtractionError>;
}
