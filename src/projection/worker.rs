//! Projection Worker
//!
//! Runs the tasks [`crate::outbox::DispatchRegistry`] names for a given event,
//! one outbox row at a time. Tasks are independent: one failing does not stop
//! the others, but the worker still reports failure so the dispatcher can
//! retry (or eventually dead-letter) the row.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::ExternalError;
use crate::event_store::StoredEvent;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Provider(#[from] ExternalError),
}

/// A single named unit of read-model or side-effect work, triggered by events.
#[async_trait]
pub trait ProjectionTask: Send + Sync {
    /// Stable name, matching the strings [`crate::outbox::DispatchRegistry`] returns.
    fn name(&self) -> &'static str;

    /// Process one event. Must be idempotent: redelivering the same
    /// `event_id` must leave the read model in the same state.
    async fn handle(&self, event: &StoredEvent) -> Result<(), ProjectionError>;
}

/// Dispatches a stored event to the named tasks registered for it.
pub struct ProjectionWorker {
    tasks: HashMap<&'static str, Box<dyn ProjectionTask>>,
}

impl ProjectionWorker {
    pub fn new(tasks: Vec<Box<dyn ProjectionTask>>) -> Self {
        Self {
            tasks: tasks.into_iter().map(|t| (t.name(), t)).collect(),
        }
    }

    /// Run every task in `task_names` against `event`. Returns the first
    /// error encountered, if any, after every task has had a chance to run.
    pub async fn process(
        &self,
        event: &StoredEvent,
        task_names: &[&str],
    ) -> Result<(), ProjectionError> {
        let mut first_err = None;

        for name in task_names {
            let Some(task) = self.tasks.get(name) else {
                tracing::warn!(task = *name, "no projection task registered for name");
                continue;
            };

            if let Err(e) = task.handle(event).await {
                tracing::error!(
                    task = *name,
                    event_id = %event.event_id,
                    error = %e,
                    "projection task failed"
                );
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    use crate::domain::UserEvent;

    struct CountingTask {
        name: &'static str,
        fail: bool,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ProjectionTask for CountingTask {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn handle(&self, _event: &StoredEvent) -> Result<(), ProjectionError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if self.fail {
                Err(ProjectionError::Database(sqlx::Error::RowNotFound))
            } else {
                Ok(())
            }
        }
    }

    fn sample_event() -> StoredEvent {
        let user_id = Uuid::new_v4();
        StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_id: user_id,
            revision: 1,
            timestamp: Utc::now(),
            metadata: serde_json::json!({}),
            event: UserEvent::UserDeleted {
                user_id,
                deleted_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn test_unregistered_task_is_skipped_not_errored() {
        let worker = ProjectionWorker::new(vec![]);
        let result = worker.process(&sample_event(), &["nope"]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_the_other_task() {
        let a = Box::new(CountingTask {
            name: "a",
            fail: true,
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let b = Box::new(CountingTask {
            name: "b",
            fail: false,
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let worker = ProjectionWorker::new(vec![a, b]);

        let result = worker.process(&sample_event(), &["a", "b"]).await;
        assert!(result.is_err());
    }
}
