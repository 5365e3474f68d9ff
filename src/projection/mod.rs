//! Projection Workers
//!
//! Each task consumes a single persisted event, independently of the others.
//! Tasks are idempotent (processing the same `event_id` twice yields the same
//! read-model state), deterministic on their inputs (timestamps come from the
//! event, never the wall clock), and isolated (each owns its own `UnitOfWork`
//! or provider call; a failure rolls back and the outbox redelivers).

mod read_user;
mod welcome_email;
mod worker;

pub use read_user::ReadUserProjection;
pub use welcome_email::WelcomeEmailProjection;
pub use worker::{ProjectionError, ProjectionTask, ProjectionWorker};
