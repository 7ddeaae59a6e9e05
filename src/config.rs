//! Configuration types.
//!
//! Everything is read from the environment (optionally seeded from a `.env`
//! file by the binary before `BotConfig::from_env()` runs).

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default Graph API base for the WhatsApp Cloud API.
pub const DEFAULT_WHATSAPP_API_BASE: &str = "https://graph.facebook.com/v22.0";

/// Default user agent for profile fetches.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Outbound messaging credentials.
#[derive(Debug)]
pub struct MessagingConfig {
    pub access_token: SecretString,
    pub phone_number_id: String,
    pub api_base: String,
}

/// Where the libSQL store lives.
#[derive(Debug)]
pub struct StoreConfig {
    /// Local directory, `:memory:`, or a `libsql://` / `https://` remote URL.
    pub uri: String,
    /// Database name; the file stem for local stores.
    pub database: String,
    /// Auth token for remote stores.
    pub auth_token: Option<SecretString>,
}

impl StoreConfig {
    pub fn is_remote(&self) -> bool {
        self.uri.starts_with("libsql://")
            || self.uri.starts_with("https://")
            || self.uri.starts_with("http://")
    }

    pub fn is_memory(&self) -> bool {
        self.uri == ":memory:"
    }

    /// Path of the local database file.
    pub fn local_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.uri).join(format!("{}.db", self.database))
    }
}

/// Worker pool limits.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Messages processed concurrently.
    pub max_concurrent_messages: usize,
    /// Ingestion pipelines running concurrently (across all users).
    pub max_concurrent_ingestions: usize,
    /// Jobs allowed to wait for a permit, per pool.
    pub max_queued_jobs: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_messages: 16,
            max_concurrent_ingestions: 4,
            max_queued_jobs: 256,
        }
    }
}

/// Full service configuration.
#[derive(Debug)]
pub struct BotConfig {
    pub messaging: MessagingConfig,
    pub verify_token: SecretString,
    pub store: StoreConfig,
    pub port: u16,
    pub webhook_path: String,
    pub user_agent: String,
    pub workers: WorkerConfig,
    /// Return the user to `waiting_for_url` when an ingestion job ends
    /// without a completed catalog.
    pub reset_on_ingestion_failure: bool,
    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,
}

impl BotConfig {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_token = required("WHATSAPP_TOKEN")?;
        let phone_number_id = required("WHATSAPP_PHONE_NUMBER_ID")?;
        let verify_token = required("VERIFY_TOKEN")?;

        let api_base = optional("WHATSAPP_API_BASE")
            .unwrap_or_else(|| DEFAULT_WHATSAPP_API_BASE.to_string());

        let store = StoreConfig {
            uri: optional("STORE_URI").unwrap_or_else(|| "./data".to_string()),
            database: optional("STORE_DATABASE").unwrap_or_else(|| "catalog_bot".to_string()),
            auth_token: optional("STORE_AUTH_TOKEN").map(SecretString::from),
        };

        let mut webhook_path =
            optional("WEBHOOK_ENDPOINT").unwrap_or_else(|| "/webhook".to_string());
        if !webhook_path.starts_with('/') {
            webhook_path.insert(0, '/');
        }

        let defaults = WorkerConfig::default();
        let workers = WorkerConfig {
            max_concurrent_messages: parsed(
                "MAX_CONCURRENT_MESSAGES",
                defaults.max_concurrent_messages,
            )?,
            max_concurrent_ingestions: parsed(
                "MAX_CONCURRENT_INGESTIONS",
                defaults.max_concurrent_ingestions,
            )?,
            max_queued_jobs: parsed("MAX_QUEUED_JOBS", defaults.max_queued_jobs)?,
        };

        Ok(Self {
            messaging: MessagingConfig {
                access_token: SecretString::from(access_token),
                phone_number_id,
                api_base,
            },
            verify_token: SecretString::from(verify_token),
            store,
            port: parsed("PORT", 8080)?,
            webhook_path,
            user_agent: optional("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            workers,
            reset_on_ingestion_failure: parsed("RESET_ON_INGESTION_FAILURE", true)?,
            json_logs: optional("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(key: &str) -> Result<String, ConfigError> {
    optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
