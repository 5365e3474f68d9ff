//! Outbox
//!
//! A transactional outbox: rows enqueued by a `UnitOfWork` in the same
//! transaction as the event append they describe, published asynchronously by
//! [`dispatcher::OutboxDispatcher`] and consumed by projection workers.
//! Guarantees at-least-once delivery per event.

mod dispatcher;
mod registry;

pub use dispatcher::OutboxDispatcher;
pub use registry::DispatchRegistry;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Lifecycle of one outbox row: `Pending -> Publishing -> Published`, with a
/// `Failed(n)` detour that returns to `Pending` after backoff until `n` reaches
/// the configured max, at which point the row moves to `DeadLetter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Publishing,
    Published,
    Failed,
    DeadLetter,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Publishing => "publishing",
            OutboxStatus::Published => "published",
            OutboxStatus::Failed => "failed",
            OutboxStatus::DeadLetter => "dead_letter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "publishing" => Some(Self::Publishing),
            "published" => Some(Self::Published),
            "failed" => Some(Self::Failed),
            "dead_letter" => Some(Self::DeadLetter),
            _ => None,
        }
    }
}

/// A row pulled off the outbox table, ready to be fanned out to its
/// registered tasks.
#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: Uuid,
    pub event_id: Uuid,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
}
