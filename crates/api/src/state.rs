//! Shared application state for the Axum API server.

use std::sync::Arc;

use sqlx::PgPool;

use pushcast_common::config::AppConfig;
use pushcast_common::transport::Transport;
use pushcast_engine::dispatcher::{DispatchOptions, Dispatcher};
use pushcast_engine::pg_store::PgStore;
use pushcast_engine::queue::DispatchQueue;
use pushcast_engine::retraction::Retractor;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub store: Arc<PgStore>,
    pub queue: DispatchQueue,
    pub retractor: Arc<Retractor>,
}

impl AppState {
    /// Wire the dispatch engine over `pool` and `transport`.
    pub fn new(pool: PgPool, config: AppConfig, transport: Arc<dyn Transport>) -> Self {
        let store = Arc::new(PgStore::new(pool.clone()));

        let dispatcher = Dispatcher::new(
            store.clone(),
            store.clone(),
            Arc::clone(&transport),
            DispatchOptions::from_config(&config),
        );
        let queue = DispatchQueue::new(Arc::new(dispatcher), config.dispatch_workers);
        let retractor = Arc::new(Retractor::new(store.clone(), store.clone(), transport));

        Self {
            pool,
            config,
            store,
            queue,
            retractor,
        }
    }
}
