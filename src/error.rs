//! Error types for the catalog bot.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Outbound messaging errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Channel {name} rejected message with status {status}")]
    Rejected { name: String, status: u16 },
}

/// Profile extraction errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractionError {
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Profile {url} returned status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("Could not parse profile page: {0}")]
    Parse(String),
}

/// Input validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid URL format")]
    MalformedUrl,

    #[error("not an Instagram URL (host: {0})")]
    WrongHost(String),

    #[error("no username found in URL")]
    MissingHandle,

    #[error("invalid Instagram username format: {0}")]
    InvalidHandle(String),
}

/// Background job errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Worker pool {pool} is full ({capacity} jobs queued or running)")]
    QueueFull { pool: String, capacity: usize },
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn persist() -> Result<()> {
        Err(DatabaseError::NotFound {
            entity: "user".into(),
            id: "15550001111".into(),
        })?;
        Ok(())
    }

    #[test]
    fn component_errors_convert_with_question_mark() {
        let err = persist().unwrap_err();
        assert!(matches!(err, Error::Database(DatabaseError::NotFound { .. })));
        assert_eq!(
            err.to_string(),
            "Database error: Entity not found: user with id 15550001111"
        );
    }

    #[test]
    fn queue_full_names_the_pool() {
        let err: Error = JobError::QueueFull {
            pool: "ingestions".into(),
            capacity: 260,
        }
        .into();
        assert!(err.to_string().contains("ingestions"));
    }
}
