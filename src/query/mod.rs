//! Query Handlers
//!
//! Read-only access: direct reads against the `read_user` projection, plus
//! historical reconstruction by folding the event stream up to a point in
//! time. Never mutates anything; the read model is maintained exclusively by
//! projections.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::aggregate::{Aggregate, User};
use crate::domain::{AggregateKind, DomainError, Role};
use crate::error::{CoreError, StorageError};
use crate::event_store::{EventStore, StreamFilter};

/// Projected user fields returned by every query shape.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id(),
            username: user.username().to_string(),
            email: user.email().to_string(),
            first_name: user.first_name().to_string(),
            last_name: user.last_name().to_string(),
            role: user.role(),
            created_at: user.created_at(),
            updated_at: user.updated_at(),
            deleted_at: user.deleted_at(),
        }
    }
}

const MIN_PAGE_SIZE: u32 = 1;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct ListUsersQuery {
    pub page: u32,
    pub page_size: u32,
    pub username: Option<String>,
    pub email: Option<String>,
}

pub struct QueryService {
    pool: PgPool,
    event_store: EventStore,
}

impl QueryService {
    pub fn new(pool: PgPool, event_store: EventStore) -> Self {
        Self { pool, event_store }
    }

    /// Fetch the current read-model row for `user_id`.
    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<UserDto>, CoreError> {
        let row = sqlx::query_as::<_, (Uuid, String, String, String, String, String, Option<DateTime<Utc>>, Option<DateTime<Utc>>, Option<DateTime<Utc>>)>(
            r#"
            SELECT id, username, email, first_name, last_name, role, created_at, updated_at, deleted_at
            FROM read_user WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(row.map(
            |(id, username, email, first_name, last_name, role, created_at, updated_at, deleted_at)| UserDto {
                id,
                username,
                email,
                first_name,
                last_name,
                role: if role == "admin" { Role::Admin } else { Role::User },
                created_at,
                updated_at,
                deleted_at,
            },
        ))
    }

    /// Paginated, optionally filtered read-model listing. `page >= 1`,
    /// `1 <= page_size <= 100`.
    pub async fn list_users(&self, query: ListUsersQuery) -> Result<Vec<UserDto>, CoreError> {
        if query.page < 1 {
            return Err(DomainError::validation("page").into());
        }
        if query.page_size < MIN_PAGE_SIZE || query.page_size > MAX_PAGE_SIZE {
            return Err(DomainError::validation("page_size").into());
        }

        let offset = (query.page - 1) as i64 * query.page_size as i64;
        let rows = sqlx::query_as::<_, (Uuid, String, String, String, String, String, Option<DateTime<Utc>>, Option<DateTime<Utc>>, Option<DateTime<Utc>>)>(
            r#"
            SELECT id, username, email, first_name, last_name, role, created_at, updated_at, deleted_at
            FROM read_user
            WHERE ($1::text IS NULL OR username = $1)
              AND ($2::text IS NULL OR email = $2)
            ORDER BY created_at ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&query.username)
        .bind(&query.email)
        .bind(query.page_size as i64)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Database)?;

        Ok(rows
            .into_iter()
            .map(
                |(id, username, email, first_name, last_name, role, created_at, updated_at, deleted_at)| UserDto {
                    id,
                    username,
                    email,
                    first_name,
                    last_name,
                    role: if role == "admin" { Role::Admin } else { Role::User },
                    created_at,
                    updated_at,
                    deleted_at,
                },
            )
            .collect())
    }

    /// Reconstruct the aggregate as of `at`, folding only events with
    /// `timestamp <= at` — snapshots are never used here since a cached
    /// snapshot could be newer than `at`.
    pub async fn get_user_at(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<UserDto, CoreError> {
        let filter = StreamFilter {
            to_time: Some(at + chrono::Duration::microseconds(1)),
            ..Default::default()
        };

        let events = self
            .event_store
            .get_stream(user_id, AggregateKind::User, &filter)
            .await
            .map_err(StorageError::from)?;

        if events.is_empty() {
            return Err(DomainError::not_found("User", user_id.to_string()).into());
        }

        let user = events
            .into_iter()
            .map(|stored| stored.event)
            .fold(User::default(), User::fold);

        Ok(UserDto::from(&user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_dto_from_fresh_user() {
        let user = User::default();
        let dto = UserDto::from(&user);
        assert_eq!(dto.username, "");
    }
}
