//! Pushcast API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pushcast_common::config::AppConfig;
use pushcast_common::db::{create_pool, run_migrations};
use pushcast_engine::scheduler::ScheduledDispatcher;
use pushcast_engine::store::PushStore;
use pushcast_notifier::TelegramTransport;

use pushcast_api::routes::create_router;
use pushcast_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "pushcast_api=debug,pushcast_engine=debug,pushcast_notifier=info,tower_http=debug",
            )
        }))
        .init();

    tracing::info!("Starting Pushcast API server...");

    let config = AppConfig::from_env()?;

    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    run_migrations(&pool).await?;

    let transport = TelegramTransport::new(&config)?;
    tracing::info!(api_url = %config.telegram_api_url, "Telegram transport ready");

    let state = AppState::new(pool, config.clone(), Arc::new(transport));

    // Runs claimed by a previous process can no longer finish
    let orphaned = state.store.cancel_orphaned_sending(chrono::Utc::now()).await?;
    if !orphaned.is_empty() {
        tracing::warn!(
            count = orphaned.len(),
            push_ids = ?orphaned,
            "Cancelled pushes left in sending by a previous run"
        );
    }

    let scheduler = ScheduledDispatcher::new(
        state.store.clone(),
        state.queue.clone(),
        config.scheduler_poll_interval_secs,
    );
    tokio::spawn(scheduler.run());

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
