//! Event-sourced user-management engine — process entrypoint.
//!
//! Boots the CORE as a long-running daemon: constructs the event store,
//! command handlers, and query service once at startup — a root object
//! owning the pool, not a per-request DI container — then runs the outbox
//! dispatcher until shutdown. There is no HTTP surface here; that front-end
//! is a named Non-goal. This binary is the engine a front-end would embed,
//! running the write-side publication loop on its own.

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::{watch, Notify};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use user_events::config::Config;
use user_events::db;
use user_events::event_store::EventStore;
use user_events::handlers::{ChangePasswordHandler, CreateUserHandler, DeleteUserHandler, UpdateUserHandler};
use user_events::outbox::OutboxDispatcher;
use user_events::projection::{ProjectionWorker, ReadUserProjection, WelcomeEmailProjection};
use user_events::providers::LoggingEmailProvider;
use user_events::query::QueryService;

/// Root object: owns the pool and every handler/service built on top of it,
/// constructed once at startup. Command/query handlers are this binary's
/// embeddable library surface; the daemon itself only drives the dispatcher.
#[allow(dead_code)]
struct Engine {
    pub create_user: CreateUserHandler,
    pub update_user: UpdateUserHandler,
    pub change_password: ChangePasswordHandler,
    pub delete_user: DeleteUserHandler,
    pub query: QueryService,
    dispatcher: OutboxDispatcher,
}

impl Engine {
    fn new(pool: sqlx::PgPool, config: &Config) -> Self {
        let event_store = EventStore::new(pool.clone());
        let nudge = Arc::new(Notify::new());

        let email_provider = Arc::new(LoggingEmailProvider::new());
        let worker = Arc::new(ProjectionWorker::new(vec![
            Box::new(ReadUserProjection::new(pool.clone())),
            Box::new(WelcomeEmailProjection::new(email_provider)),
        ]));

        let dispatcher = OutboxDispatcher::new(
            pool.clone(),
            worker,
            Duration::from_millis(config.outbox_poll_interval_ms),
            config.outbox_batch_size,
            config.projection_max_attempts,
            nudge.clone(),
        );

        Self {
            create_user: CreateUserHandler::new(
                pool.clone(),
                config.max_command_retries,
                config.snapshot_interval,
                Some(nudge.clone()),
            ),
            update_user: UpdateUserHandler::new(
                pool.clone(),
                config.max_command_retries,
                config.snapshot_interval,
                Some(nudge.clone()),
            ),
            change_password: ChangePasswordHandler::new(
                pool.clone(),
                config.max_command_retries,
                config.snapshot_interval,
                Some(nudge.clone()),
            ),
            delete_user: DeleteUserHandler::new(
                pool.clone(),
                config.max_command_retries,
                config.snapshot_interval,
                Some(nudge),
            ),
            query: QueryService::new(pool, event_store),
            dispatcher,
        }
    }

    async fn run_dispatcher(&self, shutdown: watch::Receiver<bool>) {
        self.dispatcher.run(shutdown).await;
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "user_events=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;

    tracing::info!(environment = %config.environment, "starting user_events engine");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("database schema is not complete; run migrations before starting");
        return Err(anyhow::anyhow!("database schema incomplete"));
    }
    db::verify_connection(&pool).await?;

    tracing::info!("database connected, schema verified");

    let engine = Engine::new(pool.clone(), &config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher_task = tokio::spawn(async move {
        engine.run_dispatcher(shutdown_rx).await;
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping dispatcher");
    let _ = shutdown_tx.send(true);
    let _ = dispatcher_task.await;

    pool.close().await;
    tracing::info!("database connections closed, goodbye");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        },
    }
}
