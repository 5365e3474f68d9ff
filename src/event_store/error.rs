//! Event Store Errors
//!
//! Error types for event store operations.

use uuid::Uuid;

/// Errors that can occur in the event store.
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict: the stream's head revision moved since
    /// the caller observed it.
    #[error("concurrency conflict for aggregate {aggregate_id}: expected revision {expected}, found {found}")]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: i64,
        found: i64,
    },

    /// An `event_id` collided with one already committed to the store.
    #[error("duplicate event id: {0}")]
    Duplicate(Uuid),

    /// The `user_identity` unique index rejected a username or email already
    /// claimed by another, non-deleted aggregate.
    #[error("identity conflict on field: {field}")]
    IdentityConflict { field: String },

    /// No schema is registered for this `(event_kind, schema_version)` pair.
    #[error("unknown schema: {event_kind} v{schema_version}")]
    SchemaUnknown {
        event_kind: String,
        schema_version: String,
    },

    /// The pair is recognized but the stored payload doesn't deserialize into it.
    #[error("invalid payload for {event_kind} v{schema_version}: {message}")]
    SchemaInvalid {
        event_kind: String,
        schema_version: String,
        message: String,
    },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A bounded command-handler retry loop gave up.
    #[error("maximum retries exceeded for atomic operation")]
    MaxRetriesExceeded,
}

impl EventStoreError {
    /// Check if this error is a concurrency conflict.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, EventStoreError::ConcurrencyConflict { .. })
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EventStoreError::ConcurrencyConflict { .. } | EventStoreError::Database(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_conflict_is_retryable() {
        let err = EventStoreError::ConcurrencyConflict {
            aggregate_id: Uuid::new_v4(),
            expected: 1,
            found: 2,
        };
        assert!(err.is_concurrency_conflict());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_duplicate_is_not_retryable() {
        let err = EventStoreError::Duplicate(Uuid::new_v4());
        assert!(!err.is_retryable());
    }
}
