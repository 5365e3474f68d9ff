//! Dispatch Registry
//!
//! Maps `event_kind -> task name[]`. A closed event set, so this is a plain
//! `match` rather than a dynamic dict lookup.

/// `event_kind -> registered task names`. Each registered task is enqueued
/// once per matching event.
pub struct DispatchRegistry;

impl DispatchRegistry {
    /// Task names registered for `event_kind`. Empty for an event kind with no
    /// projection (there are none in the current catalogue, but the registry
    /// stays total rather than panicking on an unrecognized kind).
    pub fn tasks_for(event_kind: &str) -> &'static [&'static str] {
        match event_kind {
            "UserCreated" => &["read_user_projection", "welcome_email"],
            "UserUpdated" => &["read_user_projection"],
            "PasswordChanged" => &["read_user_projection"],
            "UserDeleted" => &["read_user_projection"],
            _ => &[],
        }
    }
}
