//! Top-level error types
//!
//! Flattens the engine's failure modes into a small sum type instead of deep
//! exception hierarchies: domain/business-rule errors, storage errors, and
//! external-provider errors, composed at the boundary each caller actually sits on.

use thiserror::Error;

/// Application-wide Result type for command/query handlers.
pub type CoreResult<T> = Result<T, CoreError>;

/// Top-level error composing the three kinds a caller of this engine can see.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    External(#[from] ExternalError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Whether a caller may usefully retry this error unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Domain(e) => e.is_conflict_error(),
            CoreError::Storage(_) => true,
            CoreError::External(_) => true,
            CoreError::Config(_) => false,
        }
    }
}

/// Errors originating from the database/event-store layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    EventStore(#[from] crate::event_store::EventStoreError),
}

/// Errors originating from a pluggable provider (hashing, email).
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("provider '{provider}' unavailable")]
    Unavailable { provider: &'static str },

    #[error("provider '{provider}' failed: {message}")]
    Failed {
        provider: &'static str,
        message: String,
    },
}

pub use crate::config::ConfigError;
