//! Store for the `external_services` table.

use repoupdater_core::types::DbId;

use crate::error::StoreError;
use crate::handle::DbHandle;
use crate::models::external_service::{ExternalService, ExternalServicesListOptions};

/// Column list for `external_services` queries.
const COLUMNS: &str = "\
    id, kind, display_name, config, created_at, updated_at, deleted_at, \
    last_sync_at, next_sync_at, namespace_user_id";

/// Drop every source of service `$1` and soft-delete the repos left
/// without any. Both run in one statement, so the orphan check must
/// ignore the service's own rows that the delete removes.
const REMOVE_SOURCES_QUERY: &str = "\
    WITH removed AS ( \
        DELETE FROM external_service_repos WHERE external_service_id = $1 \
        RETURNING repo_id \
    ) \
    UPDATE repo \
    SET name = soft_deleted_repository_name(name), deleted_at = NOW() \
    WHERE id IN (SELECT repo_id FROM removed) \
      AND deleted_at IS NULL \
      AND NOT EXISTS ( \
          SELECT 1 FROM external_service_repos esr \
          WHERE esr.repo_id = repo.id AND esr.external_service_id != $1 \
      )";

/// Reads and writes code-host connections.
#[derive(Clone)]
pub struct ExternalServiceStore {
    handle: DbHandle,
}

impl ExternalServiceStore {
    pub fn new(handle: impl Into<DbHandle>) -> Self {
        Self {
            handle: handle.into(),
        }
    }

    /// Insert `svc` and refresh it from the stored row.
    pub async fn create(&self, svc: &mut ExternalService) -> Result<(), StoreError> {
        *svc = insert(&self.handle, svc).await?;
        Ok(())
    }

    /// Insert services with ID `0`, update the others.
    ///
    /// Updating a service to deleted removes its sources and soft-deletes
    /// the repos that only it supplied. Runs in its own transaction unless
    /// the store already is in one.
    pub async fn upsert(&self, svcs: &mut [ExternalService]) -> Result<(), StoreError> {
        if svcs.is_empty() {
            return Ok(());
        }

        let tx = self.handle.begin_unless_in_transaction().await?;
        let result = upsert_all(tx.as_ref().unwrap_or(&self.handle), svcs).await;
        match tx {
            Some(tx) => tx.finish(result).await,
            None => result,
        }
    }

    /// Find a live service by ID.
    pub async fn get(&self, id: DbId) -> Result<ExternalService, StoreError> {
        let query = format!(
            "SELECT {COLUMNS} FROM external_services WHERE id = $1 AND deleted_at IS NULL"
        );
        self.handle
            .fetch_optional(
                "get external service",
                sqlx::query_as::<_, ExternalService>(&query).bind(id),
            )
            .await?
            .ok_or(StoreError::NotFound {
                entity: "external service",
                id,
            })
    }

    /// List services matching `opts`, ordered by ID.
    pub async fn list(
        &self,
        opts: &ExternalServicesListOptions,
    ) -> Result<Vec<ExternalService>, StoreError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if !opts.include_deleted {
            conditions.push("deleted_at IS NULL".to_string());
        }
        if !opts.kinds.is_empty() {
            conditions.push(format!("UPPER(kind) = ANY(${bind_idx})"));
            bind_idx += 1;
        }
        if opts.namespace_user_id.is_some() {
            conditions.push(format!("namespace_user_id = ${bind_idx}"));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query =
            format!("SELECT {COLUMNS} FROM external_services {where_clause} ORDER BY id ASC");
        let mut q = sqlx::query_as::<_, ExternalService>(&query);

        if !opts.kinds.is_empty() {
            let kinds: Vec<String> = opts.kinds.iter().map(|k| k.to_uppercase()).collect();
            q = q.bind(kinds);
        }
        if let Some(user_id) = opts.namespace_user_id {
            q = q.bind(user_id);
        }

        self.handle.fetch_all("list external services", q).await
    }

    /// Soft-delete a service, removing its sources.
    pub async fn delete(&self, id: DbId) -> Result<(), StoreError> {
        let tx = self.handle.begin_unless_in_transaction().await?;
        let result = soft_delete(tx.as_ref().unwrap_or(&self.handle), id).await;
        match tx {
            Some(tx) => tx.finish(result).await,
            None => result,
        }
    }
}

async fn insert(handle: &DbHandle, svc: &ExternalService) -> Result<ExternalService, StoreError> {
    let query = format!(
        "INSERT INTO external_services \
             (kind, display_name, config, created_at, updated_at, deleted_at, \
              last_sync_at, next_sync_at, namespace_user_id) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         RETURNING {COLUMNS}"
    );
    handle
        .fetch_one(
            "insert external service",
            sqlx::query_as::<_, ExternalService>(&query)
                .bind(&svc.kind)
                .bind(&svc.display_name)
                .bind(&svc.config)
                .bind(svc.created_at)
                .bind(svc.updated_at)
                .bind(svc.deleted_at)
                .bind(svc.last_sync_at)
                .bind(svc.next_sync_at)
                .bind(svc.namespace_user_id),
        )
        .await
}

async fn update(handle: &DbHandle, svc: &ExternalService) -> Result<ExternalService, StoreError> {
    let query = format!(
        "UPDATE external_services \
         SET kind = $2, display_name = $3, config = $4, updated_at = $5, deleted_at = $6, \
             last_sync_at = $7, next_sync_at = $8, namespace_user_id = $9 \
         WHERE id = $1 \
         RETURNING {COLUMNS}"
    );
    handle
        .fetch_optional(
            "update external service",
            sqlx::query_as::<_, ExternalService>(&query)
                .bind(svc.id)
                .bind(&svc.kind)
                .bind(&svc.display_name)
                .bind(&svc.config)
                .bind(svc.updated_at)
                .bind(svc.deleted_at)
                .bind(svc.last_sync_at)
                .bind(svc.next_sync_at)
                .bind(svc.namespace_user_id),
        )
        .await?
        .ok_or(StoreError::NotFound {
            entity: "external service",
            id: svc.id,
        })
}

async fn remove_sources(handle: &DbHandle, id: DbId) -> Result<(), StoreError> {
    let done = handle
        .execute(
            "remove external service sources",
            sqlx::query(REMOVE_SOURCES_QUERY).bind(id),
        )
        .await?;
    tracing::debug!(external_service_id = id, orphaned = done.rows_affected(), "sources removed");
    Ok(())
}

async fn upsert_all(handle: &DbHandle, svcs: &mut [ExternalService]) -> Result<(), StoreError> {
    for svc in svcs.iter_mut() {
        let stored = if svc.id == 0 {
            insert(handle, svc).await?
        } else {
            update(handle, svc).await?
        };
        if stored.is_deleted() {
            remove_sources(handle, stored.id).await?;
        }
        *svc = stored;
    }
    Ok(())
}

async fn soft_delete(handle: &DbHandle, id: DbId) -> Result<(), StoreError> {
    let done = handle
        .execute(
            "delete external service",
            sqlx::query(
                "UPDATE external_services SET deleted_at = NOW() \
                 WHERE id = $1 AND deleted_at IS NULL",
            )
            .bind(id),
        )
        .await?;
    if done.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "external service",
            id,
        });
    }
    remove_sources(handle, id).await
}
