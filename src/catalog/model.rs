//! Catalog and product records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an ingestion job's catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogStatus {
    Processing,
    Completed,
    Failed,
}

impl CatalogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for CatalogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CatalogStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown catalog status: {other}")),
        }
    }
}

/// One ingestion job's record.
///
/// `completed_at` is set exactly when the status is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_url: String,
    pub status: CatalogStatus,
    pub product_count: u32,
    pub business_name: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Catalog {
    /// A fresh catalog in `processing`.
    pub fn new(user_id: Uuid, source_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            source_url: source_url.into(),
            status: CatalogStatus::Processing,
            product_count: 0,
            business_name: String::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// A product derived from one post. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub user_id: Uuid,
    pub catalog_id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    pub image_url: String,
    pub post_url: String,
    pub created_at: DateTime<Utc>,
}
