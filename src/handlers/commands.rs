//! Command definitions
//!
//! Commands represent intentions to change the system state, matching spec's
//! command catalogue exactly. Each carries a `command_id` used for
//! idempotency: two invocations with the same `command_id` against the same
//! aggregate are treated as the same operation (see `EventStore::append`).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Role;

/// Command to create a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserCommand {
    pub command_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: Role,
}

impl CreateUserCommand {
    pub fn new(
        user_id: Uuid,
        username: impl Into<String>,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        password_hash: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            command_id: Uuid::new_v4(),
            user_id,
            username: username.into(),
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            password_hash: password_hash.into(),
            role,
        }
    }
}

/// Command to update one or more profile fields. At least one of
/// `first_name`/`last_name`/`email` must be set; the aggregate rejects an
/// all-`None` update with `NoFieldsToUpdate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateUserCommand {
    pub command_id: Uuid,
    pub user_id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl UpdateUserCommand {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            command_id: Uuid::new_v4(),
            user_id,
            first_name: None,
            last_name: None,
            email: None,
        }
    }

    pub fn with_first_name(mut self, first_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self
    }

    pub fn with_last_name(mut self, last_name: impl Into<String>) -> Self {
        self.last_name = Some(last_name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Command to replace a user's password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePasswordCommand {
    pub command_id: Uuid,
    pub user_id: Uuid,
    pub new_password_hash: String,
}

impl ChangePasswordCommand {
    pub fn new(user_id: Uuid, new_password_hash: impl Into<String>) -> Self {
        Self {
            command_id: Uuid::new_v4(),
            user_id,
            new_password_hash: new_password_hash.into(),
        }
    }
}

/// Command to (idempotently) delete a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteUserCommand {
    pub command_id: Uuid,
    pub user_id: Uuid,
}

impl DeleteUserCommand {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            command_id: Uuid::new_v4(),
            user_id,
        }
    }
}
