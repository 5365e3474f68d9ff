//! Aggregate module
//!
//! Aggregate Root pattern implementation for Event Sourcing: an aggregate is a
//! stream of events plus the folded state, reconstructed by replaying the stream
//! (optionally from a snapshot) and advanced by validating commands against that
//! state.

pub mod user;

pub use user::User;

/// Capability set every aggregate kind implements: fold events into state, report
/// its identity/kind/revision, and decide whether it is due for a snapshot.
///
/// `handle(command) -> events[]` is deliberately not part of this trait: each
/// aggregate's command set has its own shape, so it lives as inherent methods on
/// the concrete aggregate (see `User::handle`).
pub trait Aggregate: Sized + Default {
    /// The type of events this aggregate folds.
    type Event;

    /// The aggregate kind tag, as stored in `event_stream_<kind>` and `snapshot_<kind>`.
    fn aggregate_kind() -> &'static str;

    /// The aggregate's identity.
    fn id(&self) -> uuid::Uuid;

    /// The revision of the last event folded; 0 for a never-folded (Empty) aggregate.
    fn revision(&self) -> i64;

    /// Fold one event into state, advancing `revision` by exactly one.
    fn fold(self, event: Self::Event) -> Self;

    /// Whether this aggregate is due for a snapshot at its current revision,
    /// given the configured cadence (`Config::snapshot_interval`).
    fn should_snapshot(&self, interval: i64) -> bool {
        self.revision() > 0 && self.revision() % interval == 0
    }
}
