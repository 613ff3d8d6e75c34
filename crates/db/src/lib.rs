//! Postgres persistence for the repo-updater.
//!
//! [`Store`] is the entry point: it owns a pool or transaction handle and
//! exposes the batch reconciliation operations. [`RepoStore`] and
//! [`ExternalServiceStore`] are plain CRUD stores that share the same handle.

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

pub mod config;
pub mod error;
pub mod handle;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod store;

pub use config::DbConfig;
pub use error::StoreError;
pub use observability::StoreMetrics;
pub use repositories::{ExternalServiceStore, GraphStore, RepoStore};
pub use store::Store;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from configuration.
///
/// A non-zero `statement_timeout_secs` is applied to every connection so a
/// runaway batch statement cannot hold locks forever.
pub async fn create_pool(config: &DbConfig) -> Result<DbPool, sqlx::Error> {
    let mut options: PgConnectOptions = config.database_url.parse()?;
    if config.statement_timeout_secs > 0 {
        options = options.options([(
            "statement_timeout",
            format!("{}s", config.statement_timeout_secs),
        )]);
    }

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all pending migrations from `db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), StoreError> {
    sqlx::migrate!("../../db/migrations").run(pool).await?;
    Ok(())
}
