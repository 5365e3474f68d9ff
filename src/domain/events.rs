//! Domain Events
//!
//! Event definitions for the User aggregate. Events are immutable facts; a new
//! schema version is a new enum variant, fields are never renamed or removed within
//! a version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's role. Closed set; `Role::Admin` carries no extra privilege inside the
/// CORE itself, it is projected data for external authorization decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

/// The closed set of aggregate kinds this engine knows how to store and fold.
/// Each kind maps to its own `event_stream_<kind>` / `snapshot_<kind>` table pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    User,
}

impl AggregateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::User => "User",
        }
    }
}

impl std::fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-related events, schema_version = "1".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_kind")]
pub enum UserEvent {
    /// A new user was created.
    UserCreated {
        user_id: Uuid,
        username: String,
        email: String,
        first_name: String,
        last_name: String,
        password_hash: String,
        role: Role,
        created_at: DateTime<Utc>,
    },

    /// One or more profile fields changed.
    UserUpdated {
        user_id: Uuid,
        changes: UserChanges,
        updated_at: DateTime<Utc>,
    },

    /// The password hash was replaced.
    PasswordChanged {
        user_id: Uuid,
        new_password_hash: String,
        changed_at: DateTime<Utc>,
    },

    /// The user was deleted. Terminal: no event follows a `UserDeleted` for the
    /// same aggregate except another (idempotent, no-op) delete attempt.
    UserDeleted { user_id: Uuid, deleted_at: DateTime<Utc> },
}

/// Optional fields carried by `UpdateUser` / `UserUpdated`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.email.is_none()
    }
}

impl UserEvent {
    /// The event kind tag, as stored in `event_stream_user.event_kind`.
    pub fn event_kind(&self) -> &'static str {
        match self {
            UserEvent::UserCreated { .. } => "UserCreated",
            UserEvent::UserUpdated { .. } => "UserUpdated",
            UserEvent::PasswordChanged { .. } => "PasswordChanged",
            UserEvent::UserDeleted { .. } => "UserDeleted",
        }
    }

    /// Schema version of this event's payload shape. Bump only by adding a new
    /// variant for a new version; never by mutating an existing one.
    pub fn schema_version(&self) -> &'static str {
        "1"
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            UserEvent::UserCreated { user_id, .. } => *user_id,
            UserEvent::UserUpdated { user_id, .. } => *user_id,
            UserEvent::PasswordChanged { user_id, .. } => *user_id,
            UserEvent::UserDeleted { user_id, .. } => *user_id,
        }
    }
}
