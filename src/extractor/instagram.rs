//! Instagram profile page extractor.
//!
//! Reads the OpenGraph title, the meta description and, when the page
//! embeds it, the `window._sharedData` JSON blob that carries recent posts.

use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use reqwest::Client;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::ExtractionError;
use crate::extractor::{Post, Profile, ProfileExtractor};

const SHARED_DATA_MARKER: &str = "window._sharedData";

/// Pointer to the profile user object inside `_sharedData`.
const USER_POINTER: &str = "/entry_data/ProfilePage/0/graphql/user";

/// Fetches profile pages over HTTPS. One request per profile.
pub struct InstagramExtractor {
    client: Client,
}

impl InstagramExtractor {
    pub fn new(user_agent: &str) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ExtractionError::RequestFailed {
                url: String::new(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ProfileExtractor for InstagramExtractor {
    #[instrument(skip(self))]
    async fn scrape(&self, profile_url: &str) -> Result<Profile, ExtractionError> {
        let response = self.client.get(profile_url).send().await.map_err(|e| {
            ExtractionError::RequestFailed {
                url: profile_url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::BadStatus {
                url: profile_url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ExtractionError::RequestFailed {
                url: profile_url.to_string(),
                reason: format!("body read failed: {e}"),
            })?;

        let profile = parse_profile_page(&body, profile_url)?;
        info!(
            username = %profile.username,
            posts = profile.posts.len(),
            "Instagram profile scraped"
        );
        Ok(profile)
    }
}

fn selector(css: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(css).map_err(|e| ExtractionError::Parse(format!("selector {css}: {e}")))
}

/// Handle from the first path segment of a profile URL.
pub fn username_from_url(profile_url: &str) -> String {
    url::Url::parse(profile_url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segs| segs.find(|s| !s.is_empty()).map(String::from))
        })
        .unwrap_or_default()
}

/// `og:title` reads like `Shop X (@shop_x) • Instagram photos and videos`.
fn display_name_from_og_title(title: &str) -> String {
    let name = match title.find(" (@") {
        Some(idx) => &title[..idx],
        None => title.split(" • ").next().unwrap_or(title),
    };
    name.trim().to_string()
}

/// Build a `Profile` from a fetched profile page.
pub fn parse_profile_page(html: &str, profile_url: &str) -> Result<Profile, ExtractionError> {
    let doc = Html::parse_document(html);
    let username = username_from_url(profile_url);

    let meta_content = |css: &str| -> Result<Option<String>, ExtractionError> {
        let sel = selector(css)?;
        Ok(doc
            .select(&sel)
            .next()
            .and_then(|el| el.value().attr("content"))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty()))
    };

    let mut display_name = meta_content(r#"meta[property="og:title"]"#)?
        .map(|t| display_name_from_og_title(&t))
        .unwrap_or_default();
    let mut bio = meta_content(r#"meta[name="description"]"#)?.unwrap_or_default();
    let mut posts = Vec::new();

    let script_sel = selector("script")?;
    let shared = doc
        .select(&script_sel)
        .map(|el| el.text().collect::<String>())
        .find(|text| text.contains(SHARED_DATA_MARKER));

    if let Some(script) = shared {
        debug!("Found Instagram shared data");
        let data = shared_data_json(&script)?;
        if let Some(user) = data.pointer(USER_POINTER) {
            if let Some(full_name) = user["full_name"].as_str().filter(|s| !s.trim().is_empty()) {
                display_name = full_name.trim().to_string();
            }
            if let Some(biography) = user["biography"].as_str().filter(|s| !s.trim().is_empty()) {
                bio = biography.to_string();
            }
            posts = posts_from_user(user);
        }
    }

    if display_name.is_empty() {
        display_name = username.clone();
    }

    Ok(Profile {
        username,
        display_name,
        bio,
        posts,
    })
}

/// Cut the JSON object out of `window._sharedData = {...};`.
fn shared_data_json(script: &str) -> Result<Value, ExtractionError> {
    let start = script
        .find(SHARED_DATA_MARKER)
        .and_then(|i| script[i..].find('{').map(|j| i + j))
        .ok_or_else(|| ExtractionError::Parse("shared data has no object".into()))?;
    let end = script
        .rfind('}')
        .filter(|&e| e > start)
        .ok_or_else(|| ExtractionError::Parse("shared data is unterminated".into()))?;

    serde_json::from_str(&script[start..=end])
        .map_err(|e| ExtractionError::Parse(format!("shared data: {e}")))
}

fn posts_from_user(user: &Value) -> Vec<Post> {
    let Some(edges) = user
        .pointer("/edge_owner_to_timeline_media/edges")
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    edges
        .iter()
        .filter_map(|edge| edge.get("node"))
        .map(|node| {
            let caption = node
                .pointer("/edge_media_to_caption/edges/0/node/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let post_url = node["shortcode"]
                .as_str()
                .map(|code| format!("https://www.instagram.com/p/{code}/"))
                .unwrap_or_default();
            let images = node["display_url"]
                .as_str()
                .map(|u| vec![u.to_string()])
                .unwrap_or_default();
            let posted_at = node["taken_at_timestamp"]
                .as_i64()
                .and_then(|ts| DateTime::from_timestamp(ts, 0))
                .map(|dt| dt.format("%Y-%m-%d").to_string());

            Post {
                hashtags: hashtags(&caption),
                post_url,
                images,
                likes: node.pointer("/edge_liked_by/count").and_then(Value::as_u64).unwrap_or(0),
                comments: node
                    .pointer("/edge_media_to_comment/count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
                posted_at,
                caption,
            }
        })
        .collect()
}

/// Hashtags in a caption, without the `#`.
pub fn hashtags(caption: &str) -> Vec<String> {
    caption
        .split_whitespace()
        .filter_map(|word| word.strip_prefix('#'))
        .map(|tag| {
            tag.chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|tag| !tag.is_empty())
        .collect()
}
