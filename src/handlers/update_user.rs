//! UpdateUser Command Handler

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Notify;

use crate::aggregate::{Aggregate, UserCommand};
use crate::domain::{AggregateKind, OperationContext};
use crate::error::{CoreError, StorageError};
use crate::event_store::EventStore;
use crate::snapshot::SnapshotStore;
use crate::uow::UnitOfWork;

use super::commands::UpdateUserCommand;
use super::{load_user, retry_on_conflict};

/// Orchestrates `UpdateUser`. `NoFieldsToUpdate` and `DeletedAggregate` are
/// aggregate-local business rules, enforced entirely inside `User::handle`.
pub struct UpdateUserHandler {
    pool: PgPool,
    event_store: EventStore,
    snapshot_store: SnapshotStore,
    max_retries: u32,
    snapshot_interval: i64,
    nudge: Option<Arc<Notify>>,
}

impl UpdateUserHandler {
    pub fn new(pool: PgPool, max_retries: u32, snapshot_interval: i64, nudge: Option<Arc<Notify>>) -> Self {
        Self {
            event_store: EventStore::new(pool.clone()),
            snapshot_store: SnapshotStore::new(pool.clone()),
            pool,
            max_retries,
            snapshot_interval,
            nudge,
        }
    }

    pub async fn execute(&self, command: UpdateUserCommand, context: &OperationContext) -> Result<(), CoreError> {
        retry_on_conflict(self.max_retries, || self.try_execute(&command, context)).await?;
        if let Some(nudge) = &self.nudge {
            nudge.notify_one();
        }
        Ok(())
    }

    async fn try_execute(&self, command: &UpdateUserCommand, context: &OperationContext) -> Result<(), CoreError> {
        let user = load_user(&self.event_store, &self.snapshot_store, command.user_id).await?;
        let expected_revision = user.revision();

        let events = user.handle(UserCommand::UpdateUser {
            first_name: command.first_name.clone(),
            last_name: command.last_name.clone(),
            email: command.email.clone(),
        })?;

        if events.is_empty() {
            return Ok(());
        }

        let metadata = context.to_metadata();
        let mut uow = UnitOfWork::begin(&self.pool, &self.event_store, &self.snapshot_store)
            .await
            .map_err(StorageError::from)?;

        let stored = uow
            .append_events(command.user_id, AggregateKind::User, &events, expected_revision, &metadata)
            .await
            .map_err(StorageError::from)?;

        let new_revision = expected_revision + stored.len() as i64;
        let folded = events.into_iter().fold(user, |u, e| u.fold(e));
        if folded.should_snapshot(self.snapshot_interval) {
            uow.upsert_snapshot(command.user_id, AggregateKind::User, new_revision, &folded)
                .await
                .map_err(StorageError::from)?;
        }

        for event in &stored {
            let payload = event.to_outbox_payload().map_err(StorageError::from)?;
            uow.enqueue_outbox(event.event_id, &payload).await.map_err(StorageError::from)?;
        }

        uow.commit().await.map_err(StorageError::from)?;
        Ok(())
    }
}
