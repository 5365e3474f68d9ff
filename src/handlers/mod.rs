//! Command Handlers
//!
//! One handler per command kind, each implementing the shared skeleton spec's
//! §4.6 describes: open a `UnitOfWork`, rehydrate the aggregate, validate the
//! command against it, append the resulting events, update the snapshot,
//! enqueue the outbox rows, commit — then nudge the dispatcher. Only
//! `ConcurrencyConflict` is retried, and only the whole load-decide-append
//! sequence, up to `Config::max_command_retries` attempts.

mod change_password;
mod commands;
mod create_user;
mod delete_user;
mod update_user;

pub use change_password::ChangePasswordHandler;
pub use commands::{ChangePasswordCommand, CreateUserCommand, DeleteUserCommand, UpdateUserCommand};
pub use create_user::CreateUserHandler;
pub use delete_user::DeleteUserHandler;
pub use update_user::UpdateUserHandler;

use std::time::Duration;

use uuid::Uuid;

use crate::aggregate::{Aggregate, User};
use crate::domain::AggregateKind;
use crate::error::{CoreError, StorageError};
use crate::event_store::{EventStore, EventStoreError, StreamFilter};
use crate::snapshot::SnapshotStore;

/// Rehydrate a `User` aggregate per spec's §4.4 algorithm: load the snapshot
/// if one exists, then fold every event with `revision > snapshot.revision`.
/// Correct regardless of whether the snapshot exists or how stale it is.
pub(crate) async fn load_user(
    event_store: &EventStore,
    snapshot_store: &SnapshotStore,
    user_id: Uuid,
) -> Result<User, CoreError> {
    let snapshot = snapshot_store
        .get::<User>(user_id, AggregateKind::User)
        .await
        .map_err(StorageError::from)?;

    let (mut user, from_revision) = match snapshot {
        Some(snap) => (snap.state, snap.revision),
        None => (User::default(), 0),
    };

    let filter = StreamFilter {
        from_revision: Some(from_revision + 1),
        ..Default::default()
    };
    let events = event_store
        .get_stream(user_id, AggregateKind::User, &filter)
        .await
        .map_err(StorageError::from)?;

    for stored in events {
        user = user.fold(stored.event);
    }

    Ok(user)
}

fn is_concurrency_conflict(err: &CoreError) -> bool {
    matches!(
        err,
        CoreError::Storage(StorageError::EventStore(EventStoreError::ConcurrencyConflict { .. }))
    )
}

/// Bounded retry of the whole load-decide-append sequence on
/// `ConcurrencyConflict`, per spec's §4.6: `50ms * attempt` backoff, up to
/// `max_attempts`. Every other error surfaces on the first try.
pub(crate) async fn retry_on_conflict<F, Fut, T>(max_attempts: u32, mut attempt_fn: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(err) if is_concurrency_conflict(&err) && attempt < max_attempts.max(1) => {
                tracing::warn!(attempt, "concurrency conflict, retrying command");
                tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
            }
            Err(err) => return Err(err),
        }
    }
}
