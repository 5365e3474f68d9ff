//! Unit of Work
//!
//! A scoped transactional boundary: `begin -> (work) -> commit | rollback`.
//! Everything a command handler writes — event appends, a snapshot upsert, an
//! outbox enqueue — goes through the same `UnitOfWork` so it lands in one
//! Postgres transaction. Single-threaded (one `&mut self` caller); nesting is
//! prevented by ownership, not a runtime check: a `UnitOfWork` can't be
//! borrowed twice at once.

use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{AggregateKind, UserEvent};
use crate::event_store::{EventStore, EventStoreError, StoredEvent};
use crate::snapshot::SnapshotStore;

/// A scoped transaction bracketing event append, snapshot upsert, and outbox
/// enqueue for a single command.
pub struct UnitOfWork<'a> {
    tx: Transaction<'a, Postgres>,
    event_store: &'a EventStore,
    snapshot_store: &'a SnapshotStore,
}

impl<'a> UnitOfWork<'a> {
    pub async fn begin(
        pool: &'a PgPool,
        event_store: &'a EventStore,
        snapshot_store: &'a SnapshotStore,
    ) -> Result<Self, EventStoreError> {
        let tx = pool.begin().await?;
        Ok(Self {
            tx,
            event_store,
            snapshot_store,
        })
    }

    /// Append events to `aggregate_id`'s stream within this unit of work.
    pub async fn append_events(
        &mut self,
        aggregate_id: Uuid,
        kind: AggregateKind,
        events: &[UserEvent],
        expected_revision: i64,
        metadata: &serde_json::Value,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.event_store
            .append_in_tx(&mut self.tx, aggregate_id, kind, events, expected_revision, metadata)
            .await
    }

    /// Claim `username`/`email` for `aggregate_id` within this unit of work,
    /// so the claim commits or rolls back atomically with the `UserCreated`
    /// append it belongs to. See `EventStore::reserve_identity_tx`.
    pub async fn reserve_identity(
        &mut self,
        aggregate_id: Uuid,
        username: &str,
        email: &str,
    ) -> Result<(), EventStoreError> {
        self.event_store
            .reserve_identity_tx(&mut self.tx, aggregate_id, username, email)
            .await
    }

    /// Release `aggregate_id`'s claimed username/email within this unit of
    /// work. See `EventStore::release_identity_tx`.
    pub async fn release_identity(&mut self, aggregate_id: Uuid) -> Result<(), EventStoreError> {
        self.event_store.release_identity_tx(&mut self.tx, aggregate_id).await
    }

    /// Upsert a snapshot within this unit of work.
    pub async fn upsert_snapshot<A>(
        &mut self,
        aggregate_id: Uuid,
        kind: AggregateKind,
        revision: i64,
        state: &A,
    ) -> Result<(), EventStoreError>
    where
        A: Serialize,
    {
        self.snapshot_store
            .put_tx(&mut self.tx, aggregate_id, kind, revision, state)
            .await
    }

    /// Enqueue a row for the outbox dispatcher to publish after this unit of
    /// work commits.
    pub async fn enqueue_outbox(
        &mut self,
        event_id: Uuid,
        payload: &serde_json::Value,
    ) -> Result<(), EventStoreError> {
        sqlx::query(
            r#"
            INSERT INTO outbox (id, event_id, payload, status, attempts, next_attempt_at)
            VALUES ($1, $2, $3, 'pending', 0, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(payload)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Commit all writes made through this unit of work.
    pub async fn commit(self) -> Result<(), EventStoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    /// Roll back all writes made through this unit of work. Idempotent in the
    /// sense that dropping an uncommitted `UnitOfWork` without calling this
    /// also rolls back (sqlx rolls back on drop), but callers should call it
    /// explicitly on any recognized error path for clarity.
    pub async fn rollback(self) -> Result<(), EventStoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
