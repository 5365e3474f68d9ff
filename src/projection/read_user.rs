//! Read-Model Projection
//!
//! Maintains `read_user`, the flat table every query in [`crate::query`] reads
//! from. Each handler is a single conditional statement guarded by
//! `revision < $new_revision` so redelivery or out-of-order arrival of the
//! same event never regresses the row.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::{Role, UserEvent};

use super::worker::{ProjectionError, ProjectionTask};
use crate::event_store::StoredEvent;

pub struct ReadUserProjection {
    pool: PgPool,
}

impl ReadUserProjection {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

#[async_trait]
impl ProjectionTask for ReadUserProjection {
    fn name(&self) -> &'static str {
        "read_user_projection"
    }

    async fn handle(&self, stored: &StoredEvent) -> Result<(), ProjectionError> {
        match &stored.event {
            UserEvent::UserCreated {
                user_id,
                username,
                email,
                first_name,
                last_name,
                role,
                created_at,
                ..
            } => {
                sqlx::query(
                    r#"
                    INSERT INTO read_user
                        (id, username, email, first_name, last_name, role, created_at, updated_at, deleted_at, revision)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $7, NULL, $8)
                    ON CONFLICT (id) DO NOTHING
                    "#,
                )
                .bind(user_id)
                .bind(username)
                .bind(email)
                .bind(first_name)
                .bind(last_name)
                .bind(Self::role_str(*role))
                .bind(created_at)
                .bind(stored.revision)
                .execute(&self.pool)
                .await?;
            }

            UserEvent::UserUpdated {
                user_id,
                changes,
                updated_at,
                ..
            } => {
                sqlx::query(
                    r#"
                    UPDATE read_user
                    SET
                        first_name = COALESCE($2, first_name),
                        last_name = COALESCE($3, last_name),
                        email = COALESCE($4, email),
                        updated_at = $5,
                        revision = $6
                    WHERE id = $1 AND revision < $6
                    "#,
                )
                .bind(user_id)
                .bind(&changes.first_name)
                .bind(&changes.last_name)
                .bind(&changes.email)
                .bind(updated_at)
                .bind(stored.revision)
                .execute(&self.pool)
                .await?;
            }

            UserEvent::PasswordChanged {
                user_id,
                changed_at,
                ..
            } => {
                sqlx::query(
                    r#"
                    UPDATE read_user
                    SET updated_at = $2, revision = $3
                    WHERE id = $1 AND revision < $3
                    "#,
                )
                .bind(user_id)
                .bind(changed_at)
                .bind(stored.revision)
                .execute(&self.pool)
                .await?;
            }

            UserEvent::UserDeleted {
                user_id,
                deleted_at,
            } => {
                sqlx::query(
                    r#"
                    UPDATE read_user
                    SET deleted_at = $2, updated_at = $2, revision = $3
                    WHERE id = $1 AND revision < $3
                    "#,
                )
                .bind(user_id)
                .bind(deleted_at)
                .bind(stored.revision)
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }
}
