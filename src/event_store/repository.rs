//! Event Store Repository
//!
//! Durable, concurrent, append-only per-aggregate stream storage. One physical
//! table per aggregate kind (`event_stream_<kind>`); the initial kind set is
//! `{User}`, so every operation here is routed at `event_stream_user`.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{AggregateKind, UserEvent};

use super::EventStoreError;

/// A single event as read back from the store: the typed payload plus the
/// envelope fields spec's Event record names (`revision`, `timestamp`, `metadata`).
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub revision: i64,
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
    pub event: UserEvent,
}

impl StoredEvent {
    /// Encode this event as the outbox's `payload` column: a self-contained
    /// envelope so the dispatcher never has to re-read the stream to learn
    /// what it is publishing.
    pub fn to_outbox_payload(&self) -> Result<serde_json::Value, EventStoreError> {
        Ok(serde_json::json!({
            "event_id": self.event_id,
            "aggregate_id": self.aggregate_id,
            "event_kind": event_kind_tag(&self.event),
            "schema_version": schema_version_tag(&self.event),
            "revision": self.revision,
            "timestamp": self.timestamp,
            "data": serde_json::to_value(&self.event)?,
            "metadata": self.metadata,
        }))
    }

    /// Decode an outbox `payload` column back into a `StoredEvent`.
    pub fn from_outbox_payload(payload: &serde_json::Value) -> Result<Self, EventStoreError> {
        let missing = |field: &str| EventStoreError::SchemaInvalid {
            event_kind: "unknown".to_string(),
            schema_version: "unknown".to_string(),
            message: format!("outbox payload missing field '{field}'"),
        };

        let event_id = payload
            .get("event_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| missing("event_id"))?;
        let aggregate_id = payload
            .get("aggregate_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| missing("aggregate_id"))?;
        let event_kind = payload
            .get("event_kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| missing("event_kind"))?;
        let schema_version = payload
            .get("schema_version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| missing("schema_version"))?;
        let revision = payload
            .get("revision")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| missing("revision"))?;
        let timestamp: DateTime<Utc> = payload
            .get("timestamp")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| missing("timestamp"))?;
        let data = payload.get("data").cloned().ok_or_else(|| missing("data"))?;
        let metadata = payload
            .get("metadata")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        let event = decode_event(event_kind, schema_version, data)?;

        Ok(StoredEvent {
            event_id,
            aggregate_id,
            revision,
            timestamp,
            metadata,
            event,
        })
    }
}

/// Half-open/inclusive filter set for `get_stream`, per spec's §4.2 contract:
/// revision bounds are inclusive, time bounds are half-open `[from_time, to_time)`.
#[derive(Debug, Clone, Default)]
pub struct StreamFilter {
    pub from_revision: Option<i64>,
    pub to_revision: Option<i64>,
    pub from_time: Option<DateTime<Utc>>,
    pub to_time: Option<DateTime<Utc>>,
}

fn event_kind_tag(event: &UserEvent) -> &'static str {
    event.event_kind()
}

fn schema_version_tag(event: &UserEvent) -> &'static str {
    event.schema_version()
}

/// Known `(event_kind, schema_version)` pairs this build can deserialize.
/// A new payload version adds a row here; it never replaces one.
fn is_known_schema(event_kind: &str, schema_version: &str) -> bool {
    matches!(
        (event_kind, schema_version),
        ("UserCreated", "1")
            | ("UserUpdated", "1")
            | ("PasswordChanged", "1")
            | ("UserDeleted", "1")
    )
}

fn decode_event(
    event_kind: &str,
    schema_version: &str,
    data: serde_json::Value,
) -> Result<UserEvent, EventStoreError> {
    if !is_known_schema(event_kind, schema_version) {
        return Err(EventStoreError::SchemaUnknown {
            event_kind: event_kind.to_string(),
            schema_version: schema_version.to_string(),
        });
    }
    serde_json::from_value(data).map_err(|e| EventStoreError::SchemaInvalid {
        event_kind: event_kind.to_string(),
        schema_version: schema_version.to_string(),
        message: e.to_string(),
    })
}

/// Append-only event stream storage for the `User` aggregate kind.
#[derive(Debug, Clone)]
pub struct EventStore {
    pool: PgPool,
}

impl EventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn table(kind: AggregateKind) -> &'static str {
        match kind {
            AggregateKind::User => "event_stream_user",
        }
    }

    /// Append `events` to `aggregate_id`'s stream, assigning consecutive
    /// revisions starting at `expected_revision + 1`. Atomic: all events commit
    /// together or none do. `command_id`, when present in `metadata`, makes the
    /// whole append idempotent: a prior append carrying the same `command_id`
    /// for this aggregate is treated as a no-op success and its first event id
    /// is returned instead of inserting again.
    pub async fn append(
        &self,
        aggregate_id: Uuid,
        kind: AggregateKind,
        events: &[UserEvent],
        expected_revision: i64,
        metadata: &serde_json::Value,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let mut tx = self.pool.begin().await?;
        let stored = self
            .append_in_tx(&mut tx, aggregate_id, kind, events, expected_revision, metadata)
            .await?;
        tx.commit().await?;
        Ok(stored)
    }

    /// Same contract as [`Self::append`], but runs against an already-open
    /// transaction so a `UnitOfWork` can share it with a snapshot upsert and an
    /// outbox enqueue.
    pub async fn append_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: Uuid,
        kind: AggregateKind,
        events: &[UserEvent],
        expected_revision: i64,
        metadata: &serde_json::Value,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let table = Self::table(kind);

        if let Some(command_id) = metadata.get("command_id").and_then(|v| v.as_str()) {
            if let Some(existing) = self
                .find_by_command_id(tx, table, aggregate_id, command_id)
                .await?
            {
                return Ok(vec![existing]);
            }
        }

        let head = self.head_revision_tx(tx, table, aggregate_id).await?;
        if head != expected_revision {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_revision,
                found: head,
            });
        }

        let timestamp = Utc::now();
        let mut stored = Vec::with_capacity(events.len());
        for (offset, event) in events.iter().enumerate() {
            let event_id = Uuid::new_v4();
            let revision = expected_revision + offset as i64 + 1;
            let data = serde_json::to_value(event)?;

            let query = format!(
                r#"
                INSERT INTO {table} (
                    id, aggregate_id, event_kind, schema_version, revision,
                    "timestamp", data, metadata
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
                table = table
            );

            let result = sqlx::query(&query)
                .bind(event_id)
                .bind(aggregate_id)
                .bind(event_kind_tag(event))
                .bind(schema_version_tag(event))
                .bind(revision)
                .bind(timestamp)
                .bind(&data)
                .bind(metadata)
                .execute(&mut *tx)
                .await;

            match result {
                Ok(_) => stored.push(StoredEvent {
                    event_id,
                    aggregate_id,
                    revision,
                    timestamp,
                    metadata: metadata.clone(),
                    event: event.clone(),
                }),
                Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                    let constraint = db_err.constraint().unwrap_or("");
                    if constraint.contains("revision") {
                        return Err(EventStoreError::ConcurrencyConflict {
                            aggregate_id,
                            expected: revision - 1,
                            found: revision, // someone else advanced the stream concurrently
                        });
                    }
                    return Err(EventStoreError::Duplicate(event_id));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(stored)
    }

    async fn find_by_command_id(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        table: &str,
        aggregate_id: Uuid,
        command_id: &str,
    ) -> Result<Option<StoredEvent>, EventStoreError> {
        let query = format!(
            r#"
            SELECT id, aggregate_id, event_kind, schema_version, revision, "timestamp", data, metadata
            FROM {table}
            WHERE aggregate_id = $1 AND metadata->>'command_id' = $2
            ORDER BY revision ASC LIMIT 1
            "#,
            table = table
        );
        let row: Option<(
            Uuid,
            Uuid,
            String,
            String,
            i64,
            DateTime<Utc>,
            serde_json::Value,
            serde_json::Value,
        )> = sqlx::query_as(&query)
            .bind(aggregate_id)
            .bind(command_id)
            .fetch_optional(&mut **tx)
            .await?;

        row.map(
            |(event_id, aggregate_id, event_kind, schema_version, revision, timestamp, data, metadata)| {
                let event = decode_event(&event_kind, &schema_version, data)?;
                Ok(StoredEvent {
                    event_id,
                    aggregate_id,
                    revision,
                    timestamp,
                    metadata,
                    event,
                })
            },
        )
        .transpose()
    }

    async fn head_revision_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        table: &str,
        aggregate_id: Uuid,
    ) -> Result<i64, EventStoreError> {
        let query = format!(
            "SELECT COALESCE(MAX(revision), 0) FROM {table} WHERE aggregate_id = $1",
            table = table
        );
        let head: i64 = sqlx::query_scalar(&query)
            .bind(aggregate_id)
            .fetch_one(&mut **tx)
            .await?;
        Ok(head)
    }

    /// Current head revision of the stream; 0 iff the stream is empty.
    pub async fn head_revision(
        &self,
        aggregate_id: Uuid,
        kind: AggregateKind,
    ) -> Result<i64, EventStoreError> {
        let table = Self::table(kind);
        let query = format!(
            "SELECT COALESCE(MAX(revision), 0) FROM {table} WHERE aggregate_id = $1",
            table = table
        );
        let head: i64 = sqlx::query_scalar(&query)
            .bind(aggregate_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(head)
    }

    /// Read a stream in ascending revision order, filtered per `StreamFilter`.
    pub async fn get_stream(
        &self,
        aggregate_id: Uuid,
        kind: AggregateKind,
        filter: &StreamFilter,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let table = Self::table(kind);
        let query = format!(
            r#"
            SELECT id, aggregate_id, event_kind, schema_version, revision, "timestamp", data, metadata
            FROM {table}
            WHERE aggregate_id = $1
              AND ($2::bigint IS NULL OR revision >= $2)
              AND ($3::bigint IS NULL OR revision <= $3)
              AND ($4::timestamptz IS NULL OR "timestamp" >= $4)
              AND ($5::timestamptz IS NULL OR "timestamp" < $5)
            ORDER BY revision ASC
            "#,
            table = table
        );

        let rows: Vec<(
            Uuid,
            Uuid,
            String,
            String,
            i64,
            DateTime<Utc>,
            serde_json::Value,
            serde_json::Value,
        )> = sqlx::query_as(&query)
            .bind(aggregate_id)
            .bind(filter.from_revision)
            .bind(filter.to_revision)
            .bind(filter.from_time)
            .bind(filter.to_time)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(
                |(event_id, aggregate_id, event_kind, schema_version, revision, timestamp, data, metadata)| {
                    let event = decode_event(&event_kind, &schema_version, data)?;
                    Ok(StoredEvent {
                        event_id,
                        aggregate_id,
                        revision,
                        timestamp,
                        metadata,
                        event,
                    })
                },
            )
            .collect()
    }

    /// Claim `username`/`email` for `aggregate_id`, inside the same
    /// transaction as the `UserCreated` append that needs them. This is the
    /// uniqueness index spec's §4.2 `search` operation and §6 persisted-state
    /// layout call for: unlike `read_user` (populated later, out of band, by
    /// the outbox dispatcher — too late to prevent two racing `CreateUser`s
    /// on *different* aggregate ids from both reading "no conflict"), `user_identity`
    /// carries a unique index on `username` and on `email`, enforced by
    /// Postgres at insert time. Two concurrent transactions racing on the
    /// same username serialize on that index: one succeeds, the other's
    /// insert raises a unique violation and its entire transaction — event
    /// append included — rolls back. `ON CONFLICT (aggregate_id) DO NOTHING`
    /// makes a repeated reservation from the *same* aggregate (an idempotent
    /// `command_id` replay) a silent no-op rather than a spurious conflict.
    pub async fn reserve_identity_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: Uuid,
        username: &str,
        email: &str,
    ) -> Result<(), EventStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_identity (aggregate_id, username, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (aggregate_id) DO NOTHING
            "#,
        )
        .bind(aggregate_id)
        .bind(username)
        .bind(email)
        .execute(&mut **tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                let constraint = db_err.constraint().unwrap_or("");
                let field = if constraint.contains("username") {
                    "username"
                } else {
                    "email"
                };
                Err(EventStoreError::IdentityConflict {
                    field: field.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release `aggregate_id`'s claimed username/email, called from
    /// `DeleteUser`'s append transaction so a future `CreateUser` may reuse
    /// them — per spec's Invariant 9, uniqueness only holds over *non-deleted*
    /// `UserCreated` events.
    pub async fn release_identity_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: Uuid,
    ) -> Result<(), EventStoreError> {
        sqlx::query("DELETE FROM user_identity WHERE aggregate_id = $1")
            .bind(aggregate_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
