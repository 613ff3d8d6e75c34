//! Single-repo writes used by per-service syncs.
//!
//! Unlike the batch paths these touch one repo and its edge to one external
//! service per call. Each call runs in its own transaction unless the store
//! already is in one.

use std::collections::BTreeSet;

use repoupdater_core::error::CoreError;
use repoupdater_core::types::{RepoId, Timestamp};
use tracing::Instrument;

use super::Store;
use crate::error::StoreError;
use crate::handle::DbHandle;
use crate::models::external_service::ExternalService;
use crate::models::repo::{Repo, SourceInfo};
use crate::observability::Operation;

const CREATE_REPO_QUERY: &str = "\
    INSERT INTO repo ( \
        name, uri, description, \
        external_service_type, external_service_id, external_id, \
        archived, fork, stars, private, metadata, created_at) \
    VALUES ($1, NULLIF(BTRIM($2), ''), $3, \
            NULLIF($4, ''), NULLIF($5, ''), NULLIF($6, ''), \
            $7, $8, $9, $10, $11, NOW()) \
    RETURNING id, created_at";

/// Also revives a soft-deleted row.
const UPDATE_REPO_QUERY: &str = "\
    UPDATE repo SET \
        name = $1, \
        uri = NULLIF(BTRIM($2), ''), \
        description = $3, \
        external_service_type = NULLIF($4, ''), \
        external_service_id = NULLIF($5, ''), \
        external_id = NULLIF($6, ''), \
        archived = $7, \
        fork = $8, \
        stars = $9, \
        private = $10, \
        metadata = $11, \
        updated_at = NOW(), \
        deleted_at = NULL \
    WHERE id = $12 \
    RETURNING updated_at";

/// Skips the write when neither the clone URL nor the owner changed.
const UPSERT_EDGE_QUERY: &str = "\
    INSERT INTO external_service_repos (external_service_id, repo_id, user_id, clone_url) \
    VALUES ($1, $2, $3, $4) \
    ON CONFLICT ON CONSTRAINT uq_external_service_repos_repo_id_external_service_id \
    DO UPDATE SET \
        clone_url = excluded.clone_url, \
        user_id = excluded.user_id, \
        updated_at = NOW() \
    WHERE external_service_repos.clone_url != excluded.clone_url \
       OR external_service_repos.user_id IS DISTINCT FROM excluded.user_id";

const DELETE_EDGE_QUERY: &str = "\
    DELETE FROM external_service_repos \
    WHERE external_service_id = $1 AND repo_id = $2";

const DELETE_REPO_IF_ORPHAN_QUERY: &str = "\
    UPDATE repo \
    SET name = soft_deleted_repository_name(name), deleted_at = NOW() \
    WHERE id = $1 AND deleted_at IS NULL \
    AND NOT EXISTS (SELECT 1 FROM external_service_repos WHERE repo_id = $1)";

const LIST_EDGES_NOT_IN_QUERY: &str = "\
    SELECT repo_id FROM external_service_repos \
    WHERE external_service_id = $1 AND repo_id != ALL($2) \
    ORDER BY repo_id";

/// The source `svc` supplies for `r`, which must carry a clone URL.
fn source_for<'a>(
    op: &str,
    svc: &ExternalService,
    r: &'a Repo,
) -> Result<&'a SourceInfo, CoreError> {
    r.sources
        .get(&svc.urn())
        .filter(|src| !src.clone_url.is_empty())
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "{op}: repo {:?} missing source info for external service {}",
                r.name, svc.id
            ))
        })
}

fn metadata_of(r: &Repo) -> serde_json::Value {
    if r.metadata.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        r.metadata.clone()
    }
}

async fn upsert_edge(
    handle: &DbHandle,
    svc: &ExternalService,
    repo_id: RepoId,
    src: &SourceInfo,
) -> Result<(), StoreError> {
    handle
        .execute(
            "upsert external service repo",
            sqlx::query(UPSERT_EDGE_QUERY)
                .bind(svc.id)
                .bind(repo_id)
                .bind(svc.namespace_user_id)
                .bind(&src.clone_url),
        )
        .await?;
    Ok(())
}

async fn create_with_edge(
    handle: &DbHandle,
    svc: &ExternalService,
    r: &mut Repo,
    src: &SourceInfo,
) -> Result<(), StoreError> {
    let spec = &r.external_repo;
    let (id, created_at): (RepoId, Timestamp) = handle
        .fetch_one(
            "create repo",
            sqlx::query_as::<_, (RepoId, Timestamp)>(CREATE_REPO_QUERY)
                .bind(&r.name)
                .bind(r.uri.as_deref().unwrap_or_default())
                .bind(&r.description)
                .bind(&spec.service_type)
                .bind(&spec.service_id)
                .bind(&spec.id)
                .bind(r.archived)
                .bind(r.fork)
                .bind(r.stars)
                .bind(r.private)
                .bind(metadata_of(r)),
        )
        .await?;
    r.id = id;
    r.created_at = created_at;

    upsert_edge(handle, svc, id, src).await
}

async fn update_with_edge(
    handle: &DbHandle,
    svc: &ExternalService,
    r: &mut Repo,
    src: &SourceInfo,
) -> Result<(), StoreError> {
    let spec = &r.external_repo;
    let updated_at: Timestamp = handle
        .fetch_optional(
            "update repo",
            sqlx::query_as::<_, (Timestamp,)>(UPDATE_REPO_QUERY)
                .bind(&r.name)
                .bind(r.uri.as_deref().unwrap_or_default())
                .bind(&r.description)
                .bind(&spec.service_type)
                .bind(&spec.service_id)
                .bind(&spec.id)
                .bind(r.archived)
                .bind(r.fork)
                .bind(r.stars)
                .bind(r.private)
                .bind(metadata_of(r))
                .bind(r.id),
        )
        .await?
        .map(|(at,)| at)
        .ok_or(StoreError::NotFound { entity: "repo", id: r.id })?;
    r.updated_at = Some(updated_at);
    r.deleted_at = None;

    upsert_edge(handle, svc, r.id, src).await
}

async fn delete_edge(
    handle: &DbHandle,
    svc: &ExternalService,
    id: RepoId,
) -> Result<(), StoreError> {
    handle
        .execute(
            "delete external service repo",
            sqlx::query(DELETE_EDGE_QUERY).bind(svc.id).bind(id),
        )
        .await?;
    let done = handle
        .execute("delete orphaned repo", sqlx::query(DELETE_REPO_IF_ORPHAN_QUERY).bind(id))
        .await?;
    tracing::debug!(repo_id = id, orphaned = done.rows_affected() > 0, "edge deleted");
    Ok(())
}

impl Store {
    /// Insert `r` and link it to `svc`, setting `r.id` and `r.created_at`.
    ///
    /// `r.sources` must hold a source for `svc` with a clone URL. The edge
    /// records the service owner as its user.
    pub async fn create_external_service_repo(
        &self,
        svc: &ExternalService,
        r: &mut Repo,
    ) -> Result<(), StoreError> {
        let obs = self.observe(Operation::CreateExternalServiceRepo);

        let result = self
            .create_service_repo(svc, r)
            .instrument(obs.span().clone())
            .await;

        obs.span().in_scope(|| {
            tracing::debug!(external_service_id = svc.id, name = %r.name, repo_id = r.id, "create");
        });
        obs.finish(1, &result);
        result
    }

    async fn create_service_repo(
        &self,
        svc: &ExternalService,
        r: &mut Repo,
    ) -> Result<(), StoreError> {
        let src = source_for("create external service repo", svc, r)?.clone();

        let tx = self.handle().begin_unless_in_transaction().await?;
        let result = create_with_edge(tx.as_ref().unwrap_or(self.handle()), svc, r, &src).await;
        match tx {
            Some(tx) => tx.finish(result).await,
            None => result,
        }
    }

    /// Overwrite the repo with ID `r.id`, revive it if deleted, and upsert
    /// its edge to `svc`.
    pub async fn update_external_service_repo(
        &self,
        svc: &ExternalService,
        r: &mut Repo,
    ) -> Result<(), StoreError> {
        let obs = self.observe(Operation::UpdateExternalServiceRepo);

        let result = self
            .update_service_repo(svc, r)
            .instrument(obs.span().clone())
            .await;

        obs.finish(1, &result);
        result
    }

    async fn update_service_repo(
        &self,
        svc: &ExternalService,
        r: &mut Repo,
    ) -> Result<(), StoreError> {
        if r.id == 0 {
            return Err(CoreError::Validation(format!(
                "update external service repo: repo {:?} has no ID",
                r.name
            ))
            .into());
        }
        let src = source_for("update external service repo", svc, r)?.clone();

        let tx = self.handle().begin_unless_in_transaction().await?;
        let result = update_with_edge(tx.as_ref().unwrap_or(self.handle()), svc, r, &src).await;
        match tx {
            Some(tx) => tx.finish(result).await,
            None => result,
        }
    }

    /// Unlink repo `id` from `svc`, soft-deleting it when no service
    /// supplies it any more.
    pub async fn delete_external_service_repo(
        &self,
        svc: &ExternalService,
        id: RepoId,
    ) -> Result<(), StoreError> {
        let obs = self.observe(Operation::DeleteExternalServiceRepo);

        let result = async {
            let tx = self.handle().begin_unless_in_transaction().await?;
            let result = delete_edge(tx.as_ref().unwrap_or(self.handle()), svc, id).await;
            match tx {
                Some(tx) => tx.finish(result).await,
                None => result,
            }
        }
        .instrument(obs.span().clone())
        .await;

        obs.finish(1, &result);
        result
    }

    /// Unlink every repo of `svc` whose ID is not in `keep`.
    ///
    /// Repos are unlinked one at a time, each in its own transaction, so
    /// one failure does not block the rest. Returns the unlinked IDs in
    /// ascending order; if any failed, [`StoreError::PartialDelete`]
    /// carries both the successes and the failures.
    pub async fn delete_external_service_repos_not_in(
        &self,
        svc: &ExternalService,
        keep: &BTreeSet<RepoId>,
    ) -> Result<Vec<RepoId>, StoreError> {
        let obs = self.observe(Operation::DeleteExternalServiceReposNotIn);

        let result = self
            .delete_not_in(svc, keep)
            .instrument(obs.span().clone())
            .await;

        let deleted = match &result {
            Ok(ids) => ids.len(),
            Err(StoreError::PartialDelete { deleted, .. }) => deleted.len(),
            Err(_) => 0,
        };
        obs.finish(deleted, &result);
        result
    }

    async fn delete_not_in(
        &self,
        svc: &ExternalService,
        keep: &BTreeSet<RepoId>,
    ) -> Result<Vec<RepoId>, StoreError> {
        let keep: Vec<RepoId> = keep.iter().copied().collect();
        let candidates: Vec<(RepoId,)> = self
            .handle()
            .fetch_all(
                "list external service repos",
                sqlx::query_as::<_, (RepoId,)>(LIST_EDGES_NOT_IN_QUERY)
                    .bind(svc.id)
                    .bind(&keep),
            )
            .await?;

        let mut deleted = Vec::with_capacity(candidates.len());
        let mut errors = Vec::new();
        for (id,) in candidates {
            match self.delete_external_service_repo(svc, id).await {
                Ok(()) => deleted.push(id),
                Err(err) => {
                    tracing::warn!(
                        external_service_id = svc.id,
                        repo_id = id,
                        error = %err,
                        "delete failed"
                    );
                    errors.push((id, err));
                }
            }
        }

        if errors.is_empty() {
            Ok(deleted)
        } else {
            Err(StoreError::PartialDelete {
                external_service_id: svc.id,
                deleted,
                errors,
            })
        }
    }
}
