//! Profile URL validation and canonicalization.

use url::Url;

use crate::error::ValidationError;

const PROFILE_HOST: &str = "instagram.com";

/// A validated profile address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUrl {
    /// `https://www.instagram.com/<handle>/`
    pub canonical: String,
    pub handle: String,
}

/// The part of a message to validate: the first token mentioning the
/// profile host that validates, else the first such token, else the whole
/// trimmed body.
pub fn candidate_token(body: &str) -> &str {
    let mut mentions = body
        .split_whitespace()
        .filter(|token| token.to_lowercase().contains("instagram"))
        .peekable();
    let first = mentions.peek().copied();
    mentions
        .find(|token| validate_url(token).is_ok())
        .or(first)
        .unwrap_or_else(|| body.trim())
}

fn is_handle(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}

/// Check that `raw` names a profile and return its canonical form.
pub fn validate_url(raw: &str) -> Result<ProfileUrl, ValidationError> {
    let raw = raw.trim();
    let with_scheme = if raw.to_ascii_lowercase().starts_with("http") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let url = Url::parse(&with_scheme).map_err(|_| ValidationError::MalformedUrl)?;

    let host = url.host_str().unwrap_or_default();
    if host != PROFILE_HOST && !host.ends_with(&format!(".{PROFILE_HOST}")) {
        return Err(ValidationError::WrongHost(host.to_string()));
    }

    let handle = url
        .path_segments()
        .and_then(|mut segments| segments.find(|s| !s.is_empty()))
        .ok_or(ValidationError::MissingHandle)?;

    if !is_handle(handle) {
        return Err(ValidationError::InvalidHandle(handle.to_string()));
    }

    Ok(ProfileUrl {
        canonical: format!("https://www.{PROFILE_HOST}/{handle}/"),
        handle: handle.to_string(),
    })
}
