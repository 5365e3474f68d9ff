//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Snapshot cadence: write a snapshot every N committed revisions
    pub snapshot_interval: i64,

    /// How often the outbox dispatcher polls for pending rows
    pub outbox_poll_interval_ms: u64,

    /// Maximum outbox rows pulled per dispatcher tick
    pub outbox_batch_size: i64,

    /// Bounded retry count for a command handler facing `ConcurrencyConflict`
    pub max_command_retries: u32,

    /// A projection task lands on the dead-letter queue after this many failures
    pub projection_max_attempts: i32,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let snapshot_interval = env::var("SNAPSHOT_INTERVAL")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("SNAPSHOT_INTERVAL"))?;

        let outbox_poll_interval_ms = env::var("OUTBOX_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "500".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("OUTBOX_POLL_INTERVAL_MS"))?;

        let outbox_batch_size = env::var("OUTBOX_BATCH_SIZE")
            .unwrap_or_else(|_| "50".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("OUTBOX_BATCH_SIZE"))?;

        let max_command_retries = env::var("MAX_COMMAND_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("MAX_COMMAND_RETRIES"))?;

        let projection_max_attempts = env::var("PROJECTION_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("PROJECTION_MAX_ATTEMPTS"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            snapshot_interval,
            outbox_poll_interval_ms,
            outbox_batch_size,
            max_command_retries,
            projection_max_attempts,
            environment,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
