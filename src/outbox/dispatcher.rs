//! Outbox Dispatcher
//!
//! Polls the `outbox` table for `Pending` rows (and `Failed` rows whose
//! backoff has elapsed), hands each to the projection worker pool, and marks
//! the row `Published` on success or bumps `attempts`/`next_attempt_at` on
//! failure — dead-lettering once `attempts` reaches the configured max. Holds
//! a Postgres advisory lock so at most one dispatcher instance publishes at a
//! time; losing the lock is safe, since every operation here is idempotent.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::Notify;
use tokio::time::interval;
use uuid::Uuid;

use crate::event_store::StoredEvent;
use crate::projection::ProjectionWorker;

use super::{DispatchRegistry, OutboxRow, OutboxStatus};

/// Advisory lock key shared by every dispatcher instance in the fleet.
const DISPATCHER_LOCK_KEY: i64 = 0x5355_5245_5645_4E54;

pub struct OutboxDispatcher {
    pool: PgPool,
    worker: Arc<ProjectionWorker>,
    poll_interval: Duration,
    batch_size: i64,
    max_attempts: i32,
    nudge: Arc<Notify>,
}

impl OutboxDispatcher {
    pub fn new(
        pool: PgPool,
        worker: Arc<ProjectionWorker>,
        poll_interval: Duration,
        batch_size: i64,
        max_attempts: i32,
        nudge: Arc<Notify>,
    ) -> Self {
        Self {
            pool,
            worker,
            poll_interval,
            batch_size,
            max_attempts,
            nudge,
        }
    }

    /// Run the publish loop until `shutdown` is set. Ticks on `poll_interval`
    /// or as soon as a command handler nudges `nudge` after a commit,
    /// whichever comes first.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut tick = interval(self.poll_interval);
        tracing::info!("outbox dispatcher started");

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = self.nudge.notified() => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        tracing::info!("outbox dispatcher shutting down");
                        return;
                    }
                }
            }

            if !self.try_acquire_lock().await {
                continue;
            }

            if let Err(e) = self.publish_batch().await {
                tracing::error!(error = %e, "outbox dispatch batch failed");
            }
        }
    }

    async fn try_acquire_lock(&self) -> bool {
        match sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
            .bind(DISPATCHER_LOCK_KEY)
            .fetch_one(&self.pool)
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                tracing::warn!(error = %e, "failed to acquire dispatcher advisory lock");
                false
            }
        }
    }

    async fn publish_batch(&self) -> Result<(), sqlx::Error> {
        let rows = self.select_batch().await?;
        for row in rows {
            self.publish_one(row).await;
        }
        Ok(())
    }

    async fn select_batch(&self) -> Result<Vec<OutboxRow>, sqlx::Error> {
        #[allow(clippy::type_complexity)]
        let rows: Vec<(Uuid, Uuid, serde_json::Value, String, i32, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, event_id, payload, status, attempts, next_attempt_at
            FROM outbox
            WHERE status IN ('pending', 'failed') AND next_attempt_at <= NOW()
            ORDER BY next_attempt_at ASC
            LIMIT $1
            "#,
        )
        .bind(self.batch_size)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, event_id, payload, status, attempts, next_attempt_at)| {
                OutboxStatus::from_str(&status).map(|status| OutboxRow {
                    id,
                    event_id,
                    payload,
                    status,
                    attempts,
                    next_attempt_at,
                })
            })
            .collect())
    }

    /// Claim and process one row. The `UPDATE ... WHERE status IN (...)`
    /// guard is what makes a lost advisory lock safe: a second dispatcher
    /// racing on the same row simply finds zero rows affected and moves on.
    async fn publish_one(&self, row: OutboxRow) {
        let claimed = sqlx::query(
            "UPDATE outbox SET status = 'publishing' WHERE id = $1 AND status IN ('pending', 'failed')",
        )
        .bind(row.id)
        .execute(&self.pool)
        .await
        .map(|r| r.rows_affected())
        .unwrap_or(0);

        if claimed == 0 {
            return;
        }

        let stored = match StoredEvent::from_outbox_payload(&row.payload) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(outbox_id = %row.id, error = %e, "undecodable outbox payload, dead-lettering");
                let _ = sqlx::query("UPDATE outbox SET status = 'dead_letter' WHERE id = $1")
                    .bind(row.id)
                    .execute(&self.pool)
                    .await;
                return;
            }
        };

        let tasks = DispatchRegistry::tasks_for(stored.event.event_kind());
        match self.worker.process(&stored, tasks).await {
            Ok(()) => {
                let _ = sqlx::query("UPDATE outbox SET status = 'published' WHERE id = $1")
                    .bind(row.id)
                    .execute(&self.pool)
                    .await;
            }
            Err(e) => self.handle_failure(&row, e).await,
        }
    }

    async fn handle_failure(&self, row: &OutboxRow, error: crate::projection::ProjectionError) {
        let attempts = row.attempts + 1;
        tracing::warn!(outbox_id = %row.id, attempts, error = %error, "projection task failed");

        if attempts >= self.max_attempts {
            let _ = sqlx::query("UPDATE outbox SET status = 'dead_letter', attempts = $2 WHERE id = $1")
                .bind(row.id)
                .bind(attempts)
                .execute(&self.pool)
                .await;
            tracing::error!(outbox_id = %row.id, attempts, "outbox row dead-lettered");
            return;
        }

        let backoff_secs = 2i64.saturating_pow(attempts.min(6) as u32);
        let _ = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'failed', attempts = $2, next_attempt_at = NOW() + make_interval(secs => $3)
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .bind(attempts)
        .bind(backoff_secs as f64)
        .execute(&self.pool)
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_is_stable() {
        assert_eq!(DISPATCHER_LOCK_KEY, 0x5355_5245_5645_4E54);
    }
}
