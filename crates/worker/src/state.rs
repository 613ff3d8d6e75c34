use std::sync::Arc;

use prometheus::Registry;

/// Shared state available to the Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: repoupdater_db::DbPool,
    /// Registry the store metrics are registered on; served at `/metrics`.
    pub registry: Arc<Registry>,
}
