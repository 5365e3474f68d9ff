//! Integration tests for the command handlers, exercised end-to-end against
//! a real Postgres instance (no HTTP surface: the CORE is a library).

use chrono::Utc;
use uuid::Uuid;

use user_events::domain::AggregateKind;
use user_events::event_store::EventStore;
use user_events::handlers::{
    ChangePasswordCommand, ChangePasswordHandler, CreateUserCommand, CreateUserHandler, DeleteUserCommand,
    DeleteUserHandler, UpdateUserCommand, UpdateUserHandler,
};
use user_events::query::QueryService;
use user_events::{CoreError, OperationContext, Role};

mod common;

fn create_command(username: &str) -> CreateUserCommand {
    CreateUserCommand::new(
        Uuid::new_v4(),
        username,
        format!("{username}@example.com"),
        "Ada",
        "Lovelace",
        "$2b$12$abcdefghijklmnopqrstuv",
        Role::User,
    )
}

#[tokio::test]
async fn test_create_user_then_reconstruct_via_get_user_at() {
    let pool = common::setup_test_db().await;
    let create_handler = CreateUserHandler::new(pool.clone(), 3, 20, None);
    let query = QueryService::new(pool.clone(), EventStore::new(pool));

    let command = create_command("alice");
    let user_id = command.user_id;
    create_handler.execute(command, &OperationContext::new()).await.unwrap();

    let dto = query.get_user_at(user_id, Utc::now()).await.unwrap();
    assert_eq!(dto.username, "alice");
    assert_eq!(dto.email, "alice@example.com");
}

#[tokio::test]
async fn test_duplicate_username_is_rejected() {
    let pool = common::setup_test_db().await;
    let create_handler = CreateUserHandler::new(pool.clone(), 3, 20, None);

    create_handler
        .execute(create_command("bob"), &OperationContext::new())
        .await
        .unwrap();

    let mut second = create_command("bob");
    second.email = "not-bob@example.com".to_string();
    let err = create_handler
        .execute(second, &OperationContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Domain(domain_err) if domain_err.to_string().contains("username")));
}

/// Scenario S2: two `CreateUser`s for the same username, on *different*
/// aggregate ids, racing concurrently. `ConcurrencyConflict` never fires here
/// (different aggregates don't share a revision), and `read_user` isn't
/// populated until the outbox dispatcher runs — so only an identity claim
/// made atomically inside the same transaction as the append (see
/// `EventStore::reserve_identity_tx`) can keep exactly one of these two
/// commits alive.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_create_user_same_username_exactly_one_commits() {
    let pool = common::setup_test_db().await;
    let event_store = EventStore::new(pool.clone());

    let first = create_command("zelda");
    let mut second = create_command("zelda");
    second.email = "zelda2@example.com".to_string();
    let first_user_id = first.user_id;
    let second_user_id = second.user_id;

    let handler_a = CreateUserHandler::new(pool.clone(), 0, 20, None);
    let handler_b = CreateUserHandler::new(pool.clone(), 0, 20, None);

    let task_a = tokio::spawn(async move { handler_a.execute(first, &OperationContext::new()).await });
    let task_b = tokio::spawn(async move { handler_b.execute(second, &OperationContext::new()).await });

    let result_a = task_a.await.unwrap();
    let result_b = task_b.await.unwrap();

    let results = [&result_a, &result_b];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    let username_conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(CoreError::Domain(e)) if e.to_string().contains("username")))
        .count();

    assert_eq!(successes, 1, "exactly one of the two racing CreateUsers should commit");
    assert_eq!(username_conflicts, 1, "the loser should fail with a username conflict, not succeed");

    let head_a = event_store
        .head_revision(first_user_id, AggregateKind::User)
        .await
        .unwrap();
    let head_b = event_store
        .head_revision(second_user_id, AggregateKind::User)
        .await
        .unwrap();
    assert_eq!(
        head_a + head_b,
        1,
        "the stream should contain exactly one UserCreated across both aggregates"
    );
}

#[tokio::test]
async fn test_update_user_changes_profile() {
    let pool = common::setup_test_db().await;
    let create_handler = CreateUserHandler::new(pool.clone(), 3, 20, None);
    let update_handler = UpdateUserHandler::new(pool.clone(), 3, 20, None);
    let query = QueryService::new(pool.clone(), EventStore::new(pool));

    let command = create_command("carol");
    let user_id = command.user_id;
    create_handler.execute(command, &OperationContext::new()).await.unwrap();

    let update = UpdateUserCommand::new(user_id).with_email("carol2@example.com");
    update_handler.execute(update, &OperationContext::new()).await.unwrap();

    let dto = query.get_user_at(user_id, Utc::now()).await.unwrap();
    assert_eq!(dto.email, "carol2@example.com");
    assert_eq!(dto.first_name, "Ada");
}

#[tokio::test]
async fn test_change_password_to_same_hash_is_rejected() {
    let pool = common::setup_test_db().await;
    let create_handler = CreateUserHandler::new(pool.clone(), 3, 20, None);
    let change_password_handler = ChangePasswordHandler::new(pool.clone(), 3, 20, None);

    let command = create_command("dana");
    let user_id = command.user_id;
    let password_hash = command.password_hash.clone();
    create_handler.execute(command, &OperationContext::new()).await.unwrap();

    let change = ChangePasswordCommand::new(user_id, password_hash);
    let err = change_password_handler
        .execute(change, &OperationContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Domain(domain_err) if domain_err.to_string().contains("password_unchanged")));
}

#[tokio::test]
async fn test_update_after_delete_is_rejected() {
    let pool = common::setup_test_db().await;
    let create_handler = CreateUserHandler::new(pool.clone(), 3, 20, None);
    let delete_handler = DeleteUserHandler::new(pool.clone(), 3, 20, None);
    let update_handler = UpdateUserHandler::new(pool.clone(), 3, 20, None);

    let command = create_command("erin");
    let user_id = command.user_id;
    create_handler.execute(command, &OperationContext::new()).await.unwrap();

    delete_handler
        .execute(DeleteUserCommand::new(user_id), &OperationContext::new())
        .await
        .unwrap();

    let update = UpdateUserCommand::new(user_id).with_first_name("Nope");
    let err = update_handler
        .execute(update, &OperationContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::Domain(domain_err) if domain_err.to_string().contains("deleted")));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let pool = common::setup_test_db().await;
    let create_handler = CreateUserHandler::new(pool.clone(), 3, 20, None);
    let delete_handler = DeleteUserHandler::new(pool.clone(), 3, 20, None);
    let event_store = EventStore::new(pool.clone());

    let command = create_command("frank");
    let user_id = command.user_id;
    create_handler.execute(command, &OperationContext::new()).await.unwrap();

    delete_handler
        .execute(DeleteUserCommand::new(user_id), &OperationContext::new())
        .await
        .unwrap();
    delete_handler
        .execute(DeleteUserCommand::new(user_id), &OperationContext::new())
        .await
        .unwrap();

    // Only one UserDeleted event should have been appended.
    let head = event_store.head_revision(user_id, AggregateKind::User).await.unwrap();
    assert_eq!(head, 2); // UserCreated + UserDeleted
}

#[tokio::test]
async fn test_get_user_at_between_two_events_sees_only_the_first() {
    let pool = common::setup_test_db().await;
    let create_handler = CreateUserHandler::new(pool.clone(), 3, 20, None);
    let update_handler = UpdateUserHandler::new(pool.clone(), 3, 20, None);
    let query = QueryService::new(pool.clone(), EventStore::new(pool));

    let command = create_command("holly");
    let user_id = command.user_id;
    create_handler.execute(command, &OperationContext::new()).await.unwrap();

    let midpoint = Utc::now();

    let update = UpdateUserCommand::new(user_id).with_email("holly2@example.com");
    update_handler.execute(update, &OperationContext::new()).await.unwrap();

    let dto = query.get_user_at(user_id, midpoint).await.unwrap();
    assert_eq!(dto.email, "holly@example.com");
}

#[tokio::test]
async fn test_create_user_replays_on_repeated_command_id() {
    let pool = common::setup_test_db().await;
    let create_handler = CreateUserHandler::new(pool.clone(), 3, 20, None);
    let event_store = EventStore::new(pool.clone());

    let command = create_command("gina");
    let user_id = command.user_id;
    let context = OperationContext::with_command_id(command.command_id);

    create_handler.execute(command.clone(), &context).await.unwrap();
    // Second invocation carries the same command_id via the same context;
    // EventStore::append treats it as the same logical operation.
    create_handler.execute(command, &context).await.unwrap();

    let head = event_store.head_revision(user_id, AggregateKind::User).await.unwrap();
    assert_eq!(head, 1);
}
