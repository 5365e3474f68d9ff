//! Welcome Email Projection
//!
//! Pure side effect, no read-model write: sends a welcome email on
//! `UserCreated`. No-op on every other event kind so it can sit in the same
//! task registry as the read-model projections without a separate dispatch path.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::UserEvent;
use crate::error::ExternalError;
use crate::providers::EmailProvider;

use super::worker::{ProjectionError, ProjectionTask};
use crate::event_store::StoredEvent;

const WELCOME_FROM: &str = "welcome@example.com";

pub struct WelcomeEmailProjection {
    email_provider: Arc<dyn EmailProvider>,
}

impl WelcomeEmailProjection {
    pub fn new(email_provider: Arc<dyn EmailProvider>) -> Self {
        Self { email_provider }
    }

    fn welcome_body(first_name: &str, last_name: &str, username: &str) -> String {
        let full_name = format!("{first_name} {last_name}").trim().to_string();
        let display_name = if full_name.is_empty() { username } else { &full_name };

        format!(
            "Dear {display_name},\n\n\
             Welcome to our platform! We're excited to have you on board.\n\n\
             Your account has been successfully created with the username: {username}\n\n\
             If you have any questions, please don't hesitate to contact our support team.\n\n\
             Best regards,\nThe Team"
        )
    }
}

#[async_trait]
impl ProjectionTask for WelcomeEmailProjection {
    fn name(&self) -> &'static str {
        "welcome_email"
    }

    async fn handle(&self, stored: &StoredEvent) -> Result<(), ProjectionError> {
        let UserEvent::UserCreated {
            user_id,
            username,
            email,
            first_name,
            last_name,
            ..
        } = &stored.event
        else {
            return Ok(());
        };

        let subject = "Welcome to Our Platform!";
        let body = Self::welcome_body(first_name, last_name, username);

        let sent = self
            .email_provider
            .send(email, subject, &body, Some(WELCOME_FROM))
            .await?;

        if !sent {
            return Err(ProjectionError::Provider(ExternalError::Failed {
                provider: self.email_provider.name(),
                message: format!("welcome email declined for user {user_id}"),
            }));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LoggingEmailProvider;
    use chrono::Utc;
    use uuid::Uuid;

    fn created_event() -> StoredEvent {
        let user_id = Uuid::new_v4();
        StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_id: user_id,
            revision: 1,
            timestamp: Utc::now(),
            metadata: serde_json::json!({}),
            event: UserEvent::UserCreated {
                user_id,
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                first_name: "Alice".to_string(),
                last_name: "Smith".to_string(),
                password_hash: "$2b$12$hash".to_string(),
                role: crate::domain::Role::User,
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_welcome_body_falls_back_to_username() {
        let body = WelcomeEmailProjection::welcome_body("", "", "alice");
        assert!(body.contains("Dear alice,"));
    }

    #[tokio::test]
    async fn test_handle_sends_on_user_created() {
        let projection = WelcomeEmailProjection::new(Arc::new(LoggingEmailProvider::new()));
        assert!(projection.handle(&created_event()).await.is_ok());
    }

    #[tokio::test]
    async fn test_handle_is_noop_on_other_events() {
        let projection = WelcomeEmailProjection::new(Arc::new(LoggingEmailProvider::new()));
        let user_id = Uuid::new_v4();
        let event = StoredEvent {
            event_id: Uuid::new_v4(),
            aggregate_id: user_id,
            revision: 2,
            timestamp: Utc::now(),
            metadata: serde_json::json!({}),
            event: UserEvent::UserDeleted {
                user_id,
                deleted_at: Utc::now(),
            },
        };
        assert!(projection.handle(&event).await.is_ok());
    }
}
