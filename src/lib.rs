//! Event-sourced user-management engine.
//!
//! Re-exports the engine's public surface for the binary and for integration
//! tests: event store, aggregates, unit of work, outbox dispatcher, and
//! projection workers.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod event_store;
pub mod handlers;
pub mod outbox;
pub mod projection;
pub mod providers;
pub mod query;
pub mod snapshot;
pub mod uow;

pub use config::Config;
pub use domain::{AggregateKind, DomainError, OperationContext, Role, UserEvent};
pub use error::{CoreError, CoreResult, ExternalError, StorageError};
