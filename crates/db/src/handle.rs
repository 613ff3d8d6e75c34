//! Shared database handle: either the pool or one open transaction.
//!
//! Stores built from the same [`DbHandle`] run their statements on the same
//! connection, which is how sub-stores join a caller's transaction. Nested
//! `begin` calls on a transactional handle open a savepoint instead of a
//! second transaction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sqlx::postgres::{PgArguments, PgQueryResult, PgRow};
use sqlx::query::{Query, QueryAs, QueryScalar};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use crate::error::StoreError;

#[derive(Clone)]
pub enum DbHandle {
    Pool(PgPool),
    Tx(TxHandle),
}

/// One transaction, possibly narrowed to a savepoint.
#[derive(Clone)]
pub struct TxHandle {
    shared: Arc<TxShared>,
    savepoint: Option<String>,
}

struct TxShared {
    conn: Mutex<Option<Transaction<'static, Postgres>>>,
    savepoints: AtomicU64,
}

impl Drop for TxShared {
    fn drop(&mut self) {
        if self.conn.get_mut().is_some() {
            tracing::warn!("transaction dropped without done, rolling back");
        }
    }
}

impl DbHandle {
    pub fn in_transaction(&self) -> bool {
        matches!(self, DbHandle::Tx(_))
    }

    /// Start a transaction, or a savepoint when already inside one.
    pub async fn begin(&self) -> Result<DbHandle, StoreError> {
        match self {
            DbHandle::Pool(pool) => {
                let tx = pool.begin().await.map_err(StoreError::db("starting transaction"))?;
                Ok(DbHandle::Tx(TxHandle {
                    shared: Arc::new(TxShared {
                        conn: Mutex::new(Some(tx)),
                        savepoints: AtomicU64::new(0),
                    }),
                    savepoint: None,
                }))
            }
            DbHandle::Tx(tx) => {
                let n = tx.shared.savepoints.fetch_add(1, Ordering::Relaxed) + 1;
                let name = format!("sp_{n}");
                self.execute("starting transaction", sqlx::query(&format!("SAVEPOINT {name}")))
                    .await?;
                Ok(DbHandle::Tx(TxHandle {
                    shared: Arc::clone(&tx.shared),
                    savepoint: Some(name),
                }))
            }
        }
    }

    /// Commit (or release the savepoint).
    pub async fn commit(self) -> Result<(), StoreError> {
        let DbHandle::Tx(tx) = self else {
            return Err(StoreError::NotInTransaction);
        };
        let mut guard = tx.shared.conn.lock().await;
        match &tx.savepoint {
            Some(name) => {
                let conn = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
                sqlx::query(&format!("RELEASE SAVEPOINT {name}"))
                    .execute(&mut **conn)
                    .await
                    .map_err(StoreError::db("commit"))?;
                Ok(())
            }
            None => {
                let conn = guard.take().ok_or(StoreError::TransactionClosed)?;
                conn.commit().await.map_err(StoreError::db("commit"))
            }
        }
    }

    /// Roll back (or roll back to the savepoint).
    pub async fn rollback(self) -> Result<(), StoreError> {
        let DbHandle::Tx(tx) = self else {
            return Err(StoreError::NotInTransaction);
        };
        let mut guard = tx.shared.conn.lock().await;
        match &tx.savepoint {
            Some(name) => {
                let conn = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
                sqlx::query(&format!("ROLLBACK TO SAVEPOINT {name}"))
                    .execute(&mut **conn)
                    .await
                    .map_err(StoreError::db("rollback"))?;
                Ok(())
            }
            None => {
                let conn = guard.take().ok_or(StoreError::TransactionClosed)?;
                conn.rollback().await.map_err(StoreError::db("rollback"))
            }
        }
    }

    /// Commit on `Ok`, roll back on `Err`, and hand `result` back.
    ///
    /// A failed commit replaces `result`; a failed rollback is logged and
    /// the original error wins.
    pub async fn finish<T>(self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        match result {
            Ok(value) => self.commit().await.map(|()| value),
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// A new transaction, or `None` when this handle already is one.
    pub async fn begin_unless_in_transaction(&self) -> Result<Option<DbHandle>, StoreError> {
        if self.in_transaction() {
            Ok(None)
        } else {
            self.begin().await.map(Some)
        }
    }

    pub async fn execute<'q>(
        &self,
        op: &'static str,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Result<PgQueryResult, StoreError> {
        match self {
            DbHandle::Pool(pool) => query.execute(pool).await,
            DbHandle::Tx(tx) => {
                let mut guard = tx.shared.conn.lock().await;
                let conn = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
                query.execute(&mut **conn).await
            }
        }
        .map_err(StoreError::db(op))
    }

    pub async fn fetch_all<'q, T>(
        &self,
        op: &'static str,
        query: QueryAs<'q, Postgres, T, PgArguments>,
    ) -> Result<Vec<T>, StoreError>
    where
        T: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        match self {
            DbHandle::Pool(pool) => query.fetch_all(pool).await,
            DbHandle::Tx(tx) => {
                let mut guard = tx.shared.conn.lock().await;
                let conn = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
                query.fetch_all(&mut **conn).await
            }
        }
        .map_err(StoreError::db(op))
    }

    pub async fn fetch_one<'q, T>(
        &self,
        op: &'static str,
        query: QueryAs<'q, Postgres, T, PgArguments>,
    ) -> Result<T, StoreError>
    where
        T: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        match self {
            DbHandle::Pool(pool) => query.fetch_one(pool).await,
            DbHandle::Tx(tx) => {
                let mut guard = tx.shared.conn.lock().await;
                let conn = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
                query.fetch_one(&mut **conn).await
            }
        }
        .map_err(StoreError::db(op))
    }

    pub async fn fetch_optional<'q, T>(
        &self,
        op: &'static str,
        query: QueryAs<'q, Postgres, T, PgArguments>,
    ) -> Result<Option<T>, StoreError>
    where
        T: Send + Unpin + for<'r> FromRow<'r, PgRow>,
    {
        match self {
            DbHandle::Pool(pool) => query.fetch_optional(pool).await,
            DbHandle::Tx(tx) => {
                let mut guard = tx.shared.conn.lock().await;
                let conn = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
                query.fetch_optional(&mut **conn).await
            }
        }
        .map_err(StoreError::db(op))
    }

    pub async fn fetch_scalar<'q, T>(
        &self,
        op: &'static str,
        query: QueryScalar<'q, Postgres, T, PgArguments>,
    ) -> Result<T, StoreError>
    where
        T: Send + Unpin,
        (T,): for<'r> FromRow<'r, PgRow>,
    {
        match self {
            DbHandle::Pool(pool) => query.fetch_one(pool).await,
            DbHandle::Tx(tx) => {
                let mut guard = tx.shared.conn.lock().await;
                let conn = guard.as_mut().ok_or(StoreError::TransactionClosed)?;
                query.fetch_one(&mut **conn).await
            }
        }
        .map_err(StoreError::db(op))
    }
}

impl From<PgPool> for DbHandle {
    fn from(pool: PgPool) -> Self {
        DbHandle::Pool(pool)
    }
}
