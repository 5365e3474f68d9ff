//! CreateUser Command Handler

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::Notify;

use crate::aggregate::{Aggregate, UserCommand};
use crate::domain::{AggregateKind, DomainError, OperationContext};
use crate::error::{CoreError, StorageError};
use crate::event_store::{EventStore, EventStoreError};
use crate::snapshot::SnapshotStore;
use crate::uow::UnitOfWork;

use super::commands::CreateUserCommand;
use super::{load_user, retry_on_conflict};

/// Orchestrates `CreateUser`: load -> decide -> append -> reserve identity ->
/// snapshot -> enqueue -> commit -> (post-commit) nudge the dispatcher, per
/// spec's §4.6 skeleton. Uniqueness (`UsernameConflict`/`EmailConflict`) is
/// enforced by claiming the username/email in `user_identity` inside the same
/// transaction as the `UserCreated` append — a cross-aggregate check the
/// aggregate itself cannot perform, and one that must be atomic with the
/// append so two concurrent `CreateUser`s for different aggregate ids can't
/// both observe "no conflict" and both commit (spec's Scenario S2).
pub struct CreateUserHandler {
    pool: PgPool,
    event_store: EventStore,
    snapshot_store: SnapshotStore,
    max_retries: u32,
    snapshot_interval: i64,
    nudge: Option<Arc<Notify>>,
}

impl CreateUserHandler {
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

    pub async fn execute(&self, command: CreateUserCommand, context: &OperationContext) -> Result<(), CoreError> {
        retry_on_conflict(self.max_retries, || self.try_execute(&command, context)).await?;
        if let Some(nudge) = &self.nudge {
            nudge.notify_one();
        }
        Ok(())
    }

    async fn try_execute(&self, command: &CreateUserCommand, context: &OperationContext) -> Result<(), CoreError> {
        let user = load_user(&self.event_store, &self.snapshot_store, command.user_id).await?;
        let expected_revision = user.revision();

        let events = user.handle(UserCommand::CreateUser {
            user_id: command.user_id,
            username: command.username.clone(),
            email: command.email.clone(),
            first_name: command.first_name.clone(),
            last_name: command.last_name.clone(),
            password_hash: command.password_hash.clone(),
            role: command.role,
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

        match uow
            .reserve_identity(command.user_id, &command.username, &command.email)
            .await
        {
            Ok(()) => {}
            Err(EventStoreError::IdentityConflict { field }) => return Err(DomainError::conflict(field).into()),
            Err(e) => return Err(StorageError::from(e).into()),
        }

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
