//! The repo-updater store.
//!
//! A [`Store`] wraps either the connection pool or one open transaction.
//! `transact` hands out a store bound to a fresh transaction; `done`
//! finishes it. Every operation is instrumented with a tracing span and the
//! per-operation Prometheus series from [`StoreMetrics`].
//!
//! Batch writes (`upsert_repos`, `upsert_sources`) send their whole batch as
//! a single JSON parameter parsed server-side with `json_to_recordset`, so a
//! batch of any size costs one round trip and one bind parameter.

mod batch;
mod cloned;
mod counts;
mod paginate;
mod repos;
mod service_repos;
mod sources;
mod specs;
mod sync_jobs;

use sqlx::PgPool;
use tracing::Span;

use crate::error::StoreError;
use crate::handle::DbHandle;
use crate::observability::{Observation, Operation, StoreMetrics};
use crate::repositories::{ExternalServiceStore, GraphStore, RepoStore};

pub use paginate::{paginate, DEFAULT_PER_PAGE};
pub use sources::SourceChanges;

/// Reads and writes repos, their sources and external-service sync jobs.
#[derive(Clone)]
pub struct Store {
    handle: DbHandle,
    metrics: StoreMetrics,
    /// Span opened by `transact`, parent of every operation until `done`.
    tx_span: Option<Span>,
}

impl Store {
    pub fn new(pool: PgPool, metrics: StoreMetrics) -> Self {
        Self {
            handle: DbHandle::Pool(pool),
            metrics,
            tx_span: None,
        }
    }

    /// A store sharing `other`'s database handle (and so its transaction).
    pub fn with(&self, other: &Store) -> Self {
        Self {
            handle: other.handle.clone(),
            metrics: self.metrics.clone(),
            tx_span: other.tx_span.clone(),
        }
    }

    pub fn in_transaction(&self) -> bool {
        self.handle.in_transaction()
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// CRUD over `repo` on this store's handle.
    pub fn repo_store(&self) -> RepoStore {
        RepoStore::new(self.handle.clone())
    }

    /// CRUD over `external_services` on this store's handle.
    pub fn external_service_store(&self) -> ExternalServiceStore {
        ExternalServiceStore::new(self.handle.clone())
    }

    /// CRUD over `graphs` on this store's handle.
    pub fn graph_store(&self) -> GraphStore {
        GraphStore::new(self.handle.clone())
    }

    pub(crate) fn handle(&self) -> &DbHandle {
        &self.handle
    }

    pub(crate) fn observe(&self, op: Operation) -> Observation {
        Observation::start(op, &self.metrics, self.tx_span.as_ref())
    }

    /// Begin a transaction and return a store whose operations run in it.
    ///
    /// Inside an existing transaction this opens a savepoint instead. The
    /// returned store must be finished with [`Store::done`].
    pub async fn transact(&self) -> Result<Store, StoreError> {
        let obs = self.observe(Operation::Transact);
        let span = obs.span().clone();

        let result = self.handle.begin().await;
        obs.finish(1, &result);

        Ok(Store {
            handle: result?,
            metrics: self.metrics.clone(),
            tx_span: Some(span),
        })
    }

    /// Commit if `result` is `Ok`, roll back otherwise.
    ///
    /// Returns `result` unchanged unless finishing the transaction fails,
    /// in which case the commit error is returned. Rollback errors are
    /// logged and the original error wins. Calling this on a store that
    /// did not come from [`Store::transact`] returns
    /// [`StoreError::NotInTransaction`].
    pub async fn done<T>(self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        let obs = self.observe(Operation::Done);
        if let Some(span) = &self.tx_span {
            span.in_scope(|| tracing::debug!(event = "Store.Done", ok = result.is_ok()));
        }

        let outcome = if self.in_transaction() {
            self.handle.finish(result).await
        } else {
            Err(StoreError::NotInTransaction)
        };

        obs.finish(1, &outcome);
        outcome
    }
}
