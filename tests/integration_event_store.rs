//! Integration tests for the event store

use chrono::Utc;
use uuid::Uuid;

use user_events::domain::{AggregateKind, Role};
use user_events::event_store::{EventStore, EventStoreError, StreamFilter};
use user_events::UserEvent;

mod common;

fn created_event(user_id: Uuid, username: &str) -> UserEvent {
    UserEvent::UserCreated {
        user_id,
        username: username.to_string(),
        email: format!("{username}@example.com"),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        password_hash: "$2b$12$abcdefghijklmnopqrstuv".to_string(),
        role: Role::User,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_append_and_get_stream() {
    let pool = common::setup_test_db().await;
    let event_store = EventStore::new(pool);

    let user_id = Uuid::new_v4();
    let event = created_event(user_id, "alice");

    let stored = event_store
        .append(user_id, AggregateKind::User, &[event], 0, &serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].revision, 1);

    let events = event_store
        .get_stream(user_id, AggregateKind::User, &StreamFilter::default())
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.event_kind(), "UserCreated");

    let head = event_store.head_revision(user_id, AggregateKind::User).await.unwrap();
    assert_eq!(head, 1);
}

#[tokio::test]
async fn test_concurrency_conflict_on_stale_expected_revision() {
    let pool = common::setup_test_db().await;
    let event_store = EventStore::new(pool);

    let user_id = Uuid::new_v4();
    event_store
        .append(
            user_id,
            AggregateKind::User,
            &[created_event(user_id, "bob")],
            0,
            &serde_json::json!({}),
        )
        .await
        .unwrap();

    let second = UserEvent::UserDeleted {
        user_id,
        deleted_at: Utc::now(),
    };

    // expected_revision 0 is stale; the stream is already at revision 1.
    let result = event_store
        .append(user_id, AggregateKind::User, &[second], 0, &serde_json::json!({}))
        .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_append_is_idempotent_on_command_id() {
    let pool = common::setup_test_db().await;
    let event_store = EventStore::new(pool);

    let user_id = Uuid::new_v4();
    let command_id = Uuid::new_v4();
    let metadata = serde_json::json!({ "command_id": command_id });

    let first = event_store
        .append(
            user_id,
            AggregateKind::User,
            &[created_event(user_id, "carol")],
            0,
            &metadata,
        )
        .await
        .unwrap();

    // Same command_id, would-be-conflicting expected_revision: should replay
    // the original append instead of erroring or inserting again.
    let second = event_store
        .append(
            user_id,
            AggregateKind::User,
            &[created_event(user_id, "carol")],
            0,
            &metadata,
        )
        .await
        .unwrap();

    assert_eq!(first[0].event_id, second[0].event_id);

    let head = event_store.head_revision(user_id, AggregateKind::User).await.unwrap();
    assert_eq!(head, 1);
}

#[tokio::test]
async fn test_get_stream_from_revision_filters_out_earlier_events() {
    let pool = common::setup_test_db().await;
    let event_store = EventStore::new(pool);

    let user_id = Uuid::new_v4();
    event_store
        .append(
            user_id,
            AggregateKind::User,
            &[created_event(user_id, "dana")],
            0,
            &serde_json::json!({}),
        )
        .await
        .unwrap();
    event_store
        .append(
            user_id,
            AggregateKind::User,
            &[UserEvent::PasswordChanged {
                user_id,
                new_password_hash: "$2b$12$newhash".to_string(),
                changed_at: Utc::now(),
            }],
            1,
            &serde_json::json!({}),
        )
        .await
        .unwrap();

    let filter = StreamFilter {
        from_revision: Some(2),
        ..Default::default()
    };
    let events = event_store.get_stream(user_id, AggregateKind::User, &filter).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.event_kind(), "PasswordChanged");
}

#[tokio::test]
async fn test_reserve_identity_conflicts_across_different_aggregates() {
    let pool = common::setup_test_db().await;
    let event_store = EventStore::new(pool.clone());

    let first_id = Uuid::new_v4();
    let mut tx = pool.begin().await.unwrap();
    event_store
        .reserve_identity_tx(&mut tx, first_id, "erin", "erin@example.com")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    // A different aggregate claiming the same username, even with a
    // different email, must be rejected by the unique index — this is the
    // mechanism that makes two racing `CreateUser`s for different aggregate
    // ids serialize instead of both committing.
    let second_id = Uuid::new_v4();
    let mut tx = pool.begin().await.unwrap();
    let err = event_store
        .reserve_identity_tx(&mut tx, second_id, "erin", "new@example.com")
        .await
        .unwrap_err();
    tx.rollback().await.unwrap();

    assert!(matches!(err, EventStoreError::IdentityConflict { field } if field == "username"));
}

#[tokio::test]
async fn test_reserve_identity_is_a_no_op_for_a_repeated_aggregate() {
    let pool = common::setup_test_db().await;
    let event_store = EventStore::new(pool.clone());
    let user_id = Uuid::new_v4();

    let mut tx = pool.begin().await.unwrap();
    event_store
        .reserve_identity_tx(&mut tx, user_id, "frank", "frank@example.com")
        .await
        .unwrap();
    // Same aggregate reserving again (an idempotent command_id replay) must
    // not be treated as a conflict.
    event_store
        .reserve_identity_tx(&mut tx, user_id, "frank", "frank@example.com")
        .await
        .unwrap();
    tx.commit().await.unwrap();
}

#[tokio::test]
async fn test_release_identity_frees_it_for_reuse() {
    let pool = common::setup_test_db().await;
    let event_store = EventStore::new(pool.clone());

    let first_id = Uuid::new_v4();
    let mut tx = pool.begin().await.unwrap();
    event_store
        .reserve_identity_tx(&mut tx, first_id, "gina", "gina@example.com")
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = pool.begin().await.unwrap();
    event_store.release_identity_tx(&mut tx, first_id).await.unwrap();
    tx.commit().await.unwrap();

    // Once released, a new aggregate may claim the same username.
    let second_id = Uuid::new_v4();
    let mut tx = pool.begin().await.unwrap();
    event_store
        .reserve_identity_tx(&mut tx, second_id, "gina", "gina2@example.com")
        .await
        .unwrap();
    tx.commit().await.unwrap();
}
