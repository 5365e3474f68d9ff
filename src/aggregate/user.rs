//! User Aggregate
//!
//! Folds `UserEvent`s into profile state and validates commands against that
//! state per spec's business rules: uniqueness is enforced by the command
//! handler (it owns the cross-aggregate search), everything else here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::DomainError;
use crate::domain::events::{Role, UserChanges, UserEvent};

use super::Aggregate;

/// Where the aggregate sits in its lifecycle: `Empty --Created--> Live --...-->
/// Live --Deleted--> Deleted`. `Empty` is never observed by a command handler
/// that successfully loaded an existing aggregate; it is the state a fresh
/// `User::default()` starts in before any event has been folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserState {
    Empty,
    Live,
    Deleted,
}

impl Default for UserState {
    fn default() -> Self {
        Self::Empty
    }
}

/// Commands a `User` aggregate can handle, matching spec's command catalogue.
#[derive(Debug, Clone)]
pub enum UserCommand {
    CreateUser {
        user_id: Uuid,
        username: String,
        email: String,
        first_name: String,
        last_name: String,
        password_hash: String,
        role: Role,
    },
    UpdateUser {
        first_name: Option<String>,
        last_name: Option<String>,
        email: Option<String>,
    },
    ChangePassword {
        new_password_hash: String,
    },
    DeleteUser,
}

/// The User aggregate: essential profile fields only, no derived caches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    id: Uuid,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    password_hash: String,
    role: Role,
    state: UserState,
    revision: i64,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Default for Role {
    fn default() -> Self {
        Role::User
    }
}

impl User {
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> UserState {
        self.state
    }

    pub fn is_deleted(&self) -> bool {
        self.state == UserState::Deleted
    }

    pub fn is_empty(&self) -> bool {
        self.state == UserState::Empty
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Validate `command` against current state and produce the events it
    /// implies. A pure function of state + command: no I/O, no clock reads
    /// beyond `Utc::now()` for the event timestamp.
    pub fn handle(&self, command: UserCommand) -> Result<Vec<UserEvent>, DomainError> {
        match command {
            UserCommand::CreateUser {
                user_id,
                username,
                email,
                first_name,
                last_name,
                password_hash,
                role,
            } => {
                if !self.is_empty() {
                    return Err(DomainError::business_rule("already_exists"));
                }
                Ok(vec![UserEvent::UserCreated {
                    user_id,
                    username,
                    email,
                    first_name,
                    last_name,
                    password_hash,
                    role,
                    created_at: Utc::now(),
                }])
            }

            UserCommand::UpdateUser {
                first_name,
                last_name,
                email,
            } => {
                self.ensure_live()?;
                let changes = UserChanges {
                    first_name,
                    last_name,
                    email,
                };
                if changes.is_empty() {
                    return Err(DomainError::business_rule("no_fields_to_update"));
                }
                Ok(vec![UserEvent::UserUpdated {
                    user_id: self.id,
                    changes,
                    updated_at: Utc::now(),
                }])
            }

            UserCommand::ChangePassword { new_password_hash } => {
                self.ensure_live()?;
                if new_password_hash == self.password_hash {
                    return Err(DomainError::business_rule("password_unchanged"));
                }
                Ok(vec![UserEvent::PasswordChanged {
                    user_id: self.id,
                    new_password_hash,
                    changed_at: Utc::now(),
                }])
            }

            UserCommand::DeleteUser => {
                if self.is_empty() {
                    return Err(DomainError::not_found("User", self.id.to_string()));
                }
                if self.is_deleted() {
                    // Idempotent re-delete: zero new events.
                    return Ok(vec![]);
                }
                Ok(vec![UserEvent::UserDeleted {
                    user_id: self.id,
                    deleted_at: Utc::now(),
                }])
            }
        }
    }

    fn ensure_live(&self) -> Result<(), DomainError> {
        match self.state {
            UserState::Empty => Err(DomainError::not_found("User", self.id.to_string())),
            UserState::Deleted => Err(DomainError::business_rule("deleted")),
            UserState::Live => Ok(()),
        }
    }
}

impl Aggregate for User {
    type Event = UserEvent;

    fn aggregate_kind() -> &'static str {
        "User"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn revision(&self) -> i64 {
        self.revision
    }

    fn fold(mut self, event: Self::Event) -> Self {
        match event {
            UserEvent::UserCreated {
                user_id,
                username,
                email,
                first_name,
                last_name,
                password_hash,
                role,
                created_at,
            } => {
                self.id = user_id;
                self.username = username;
                self.email = email;
                self.first_name = first_name;
                self.last_name = last_name;
                self.password_hash = password_hash;
                self.role = role;
                self.state = UserState::Live;
                self.created_at = Some(created_at);
                self.updated_at = Some(created_at);
            }

            UserEvent::UserUpdated {
                changes,
                updated_at,
                ..
            } => {
                if let Some(first_name) = changes.first_name {
                    self.first_name = first_name;
                }
                if let Some(last_name) = changes.last_name {
                    self.last_name = last_name;
                }
                if let Some(email) = changes.email {
                    self.email = email;
                }
                self.updated_at = Some(updated_at);
            }

            UserEvent::PasswordChanged {
                new_password_hash,
                changed_at,
                ..
            } => {
                self.password_hash = new_password_hash;
                self.updated_at = Some(changed_at);
            }

            UserEvent::UserDeleted { deleted_at, .. } => {
                self.state = UserState::Deleted;
                self.deleted_at = Some(deleted_at);
                self.updated_at = Some(deleted_at);
            }
        }

        self.revision += 1;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_cmd(user_id: Uuid) -> UserCommand {
        UserCommand::CreateUser {
            user_id,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Smith".to_string(),
            password_hash: "$2b$12$hash".to_string(),
            role: Role::User,
        }
    }

    fn created_user(user_id: Uuid) -> User {
        let events = User::default().handle(create_cmd(user_id)).unwrap();
        events.into_iter().fold(User::default(), User::fold)
    }

    #[test]
    fn test_create_user() {
        let user_id = Uuid::new_v4();
        let events = User::default().handle(create_cmd(user_id)).unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], UserEvent::UserCreated { .. }));

        let user = events.into_iter().fold(User::default(), User::fold);
        assert_eq!(user.id(), user_id);
        assert_eq!(user.username(), "alice");
        assert_eq!(user.revision(), 1);
        assert_eq!(user.state(), UserState::Live);
    }

    #[test]
    fn test_create_on_non_empty_fails() {
        let user_id = Uuid::new_v4();
        let user = created_user(user_id);
        let err = user.handle(create_cmd(user_id)).unwrap_err();
        assert!(matches!(err, DomainError::BusinessRuleViolation { .. }));
    }

    #[test]
    fn test_update_user_email() {
        let user_id = Uuid::new_v4();
        let user = created_user(user_id);

        let events = user
            .handle(UserCommand::UpdateUser {
                first_name: None,
                last_name: None,
                email: Some("alice2@example.com".to_string()),
            })
            .unwrap();
        let user = events.into_iter().fold(user, User::fold);

        assert_eq!(user.email(), "alice2@example.com");
        assert_eq!(user.first_name(), "Alice");
        assert_eq!(user.revision(), 2);
    }

    #[test]
    fn test_update_no_fields_fails() {
        let user = created_user(Uuid::new_v4());
        let err = user
            .handle(UserCommand::UpdateUser {
                first_name: None,
                last_name: None,
                email: None,
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::BusinessRuleViolation { rule } if rule == "no_fields_to_update"));
    }

    #[test]
    fn test_change_password() {
        let user = created_user(Uuid::new_v4());
        let events = user
            .handle(UserCommand::ChangePassword {
                new_password_hash: "$2b$12$newhash".to_string(),
            })
            .unwrap();
        let user = events.into_iter().fold(user, User::fold);
        assert_eq!(user.password_hash(), "$2b$12$newhash");
    }

    #[test]
    fn test_change_password_unchanged_fails() {
        let user = created_user(Uuid::new_v4());
        let err = user
            .handle(UserCommand::ChangePassword {
                new_password_hash: "$2b$12$hash".to_string(),
            })
            .unwrap_err();
        assert!(
            matches!(err, DomainError::BusinessRuleViolation { rule } if rule == "password_unchanged")
        );
    }

    #[test]
    fn test_delete_user() {
        let user = created_user(Uuid::new_v4());
        let events = user.handle(UserCommand::DeleteUser).unwrap();
        assert_eq!(events.len(), 1);
        let user = events.into_iter().fold(user, User::fold);
        assert!(user.is_deleted());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let user = created_user(Uuid::new_v4());
        let events = user.handle(UserCommand::DeleteUser).unwrap();
        let user = events.into_iter().fold(user, User::fold);

        let events = user.handle(UserCommand::DeleteUser).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_update_after_delete_fails() {
        let user = created_user(Uuid::new_v4());
        let events = user.handle(UserCommand::DeleteUser).unwrap();
        let user = events.into_iter().fold(user, User::fold);

        let err = user
            .handle(UserCommand::UpdateUser {
                first_name: Some("X".to_string()),
                last_name: None,
                email: None,
            })
            .unwrap_err();
        assert!(matches!(err, DomainError::BusinessRuleViolation { rule } if rule == "deleted"));
    }
}
