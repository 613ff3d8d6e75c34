use repoupdater_core::error::CoreError;
use repoupdater_core::types::{DbId, ExternalRepoSpec, RepoId};

/// Error type returned by every store operation.
///
/// Database failures carry the name of the statement that failed
/// (`"update"`, `"insert"`, ...) so a failed sync can be traced back to
/// the batch that broke it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A query failed. Connection loss, deadlocks and timeouts all land here;
    /// retry policy belongs to the caller.
    #[error("{op}: {source}")]
    Database {
        op: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// A batch could not be encoded as JSON. Raised before any SQL runs.
    #[error("{op}: marshalling batch: {source}")]
    Marshal {
        op: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// An upsert finished without assigning an ID to a live repository.
    #[error("upsert did not set ID for repo {name:?} ({spec})")]
    MissingId { name: String, spec: ExternalRepoSpec },

    /// The requested row does not exist.
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// Some repos of an external service could not be unlinked. The rest
    /// were, and are listed in `deleted`.
    #[error(
        "unlinking repos of external service {external_service_id}: {} failed, {} succeeded: {}",
        .errors.len(),
        .deleted.len(),
        join_errors(.errors)
    )]
    PartialDelete {
        external_service_id: DbId,
        deleted: Vec<RepoId>,
        errors: Vec<(RepoId, StoreError)>,
    },

    /// `done` was called on a store that was not created by `transact`.
    #[error("store is not in a transaction")]
    NotInTransaction,

    /// The transaction backing this store was already committed or rolled back.
    #[error("transaction already finished")]
    TransactionClosed,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("running migrations: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Wrap a sqlx error with the statement it came from.
    pub fn db(op: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| StoreError::Database { op, source }
    }

    /// True for the tagged "no results" variant.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. } | StoreError::Core(CoreError::NotFound { .. })
        )
    }

    /// True when the error is a Postgres unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database {
                source: sqlx::Error::Database(db_err),
                ..
            } => db_err.code().as_deref() == Some("23505"),
            _ => false,
        }
    }
}

fn join_errors(errors: &[(RepoId, StoreError)]) -> String {
    errors
        .iter()
        .map(|(id, err)| format!("repo {id}: {err}"))
        .collect::<Vec<_>>()
        .join("; ")
}
