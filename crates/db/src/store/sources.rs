//! Batched reconciliation of `external_service_repos`.

use std::collections::HashMap;

use repoupdater_core::types::{DbId, RepoId};
use serde::Serialize;
use tracing::Instrument;

use super::Store;
use crate::error::StoreError;
use crate::models::repo::SourceInfo;
use crate::observability::Operation;

/// Sources keyed by the repo they belong to.
pub type SourceChanges = HashMap<RepoId, Vec<SourceInfo>>;

#[derive(Debug, Serialize)]
struct SourceRecord<'a> {
    external_service_id: DbId,
    repo_id: RepoId,
    clone_url: &'a str,
}

fn encode(op: &'static str, changes: &SourceChanges) -> Result<String, StoreError> {
    let records: Vec<SourceRecord<'_>> = changes
        .iter()
        .flat_map(|(&repo_id, sources)| {
            sources.iter().map(move |s| SourceRecord {
                external_service_id: s.external_service_id,
                repo_id,
                clone_url: &s.clone_url,
            })
        })
        .collect();
    serde_json::to_string_pretty(&records).map_err(|source| StoreError::Marshal { op, source })
}

/// `$1` inserts, `$2` updates, `$3` deletes.
///
/// Inserted rows inherit `user_id` from the owning service. An insert that
/// hits an existing pair only rewrites a changed `clone_url`.
const UPSERT_SOURCES_QUERY: &str = "
WITH inserted_sources_list AS (
  SELECT * FROM json_to_recordset($1::json)
  AS x (external_service_id bigint, repo_id bigint, clone_url text)
),
updated_sources_list AS (
  SELECT * FROM json_to_recordset($2::json)
  AS x (external_service_id bigint, repo_id bigint, clone_url text)
),
deleted_sources_list AS (
  SELECT * FROM json_to_recordset($3::json)
  AS x (external_service_id bigint, repo_id bigint, clone_url text)
),
delete_sources AS (
  DELETE FROM external_service_repos AS e
  USING deleted_sources_list AS d
  WHERE e.external_service_id = d.external_service_id
  AND e.repo_id = d.repo_id
),
update_sources AS (
  UPDATE external_service_repos AS e
  SET clone_url = u.clone_url, updated_at = NOW()
  FROM updated_sources_list AS u
  WHERE e.external_service_id = u.external_service_id
  AND e.repo_id = u.repo_id
  AND e.clone_url != u.clone_url
)
INSERT INTO external_service_repos (external_service_id, repo_id, user_id, clone_url)
SELECT i.external_service_id, i.repo_id, es.namespace_user_id, i.clone_url
FROM inserted_sources_list AS i
JOIN external_services es ON es.id = i.external_service_id
ON CONFLICT ON CONSTRAINT uq_external_service_repos_repo_id_external_service_id
DO UPDATE SET clone_url = EXCLUDED.clone_url, updated_at = NOW()
WHERE external_service_repos.clone_url != EXCLUDED.clone_url";

/// Soft-delete repos in `$1` that no longer have any source.
pub(crate) const SOFT_DELETE_ORPHANS_QUERY: &str = "
UPDATE repo
SET name = soft_deleted_repository_name(name), deleted_at = NOW()
WHERE id = ANY($1)
AND deleted_at IS NULL
AND NOT EXISTS (SELECT FROM external_service_repos esr WHERE esr.repo_id = repo.id)";

impl Store {
    /// Apply source inserts, clone-URL updates and deletes in one statement.
    ///
    /// Repos that lose their last source to `deletes` are soft-deleted, so
    /// they drop out of listings until a later sync supplies them again.
    pub async fn upsert_sources(
        &self,
        inserts: &SourceChanges,
        updates: &SourceChanges,
        deletes: &SourceChanges,
    ) -> Result<(), StoreError> {
        let obs = self.observe(Operation::UpsertSources);
        let count = inserts.len() + updates.len() + deletes.len();

        let result = self
            .apply_source_changes(inserts, updates, deletes)
            .instrument(obs.span().clone())
            .await;

        obs.finish(count, &result);
        result
    }

    async fn apply_source_changes(
        &self,
        inserts: &SourceChanges,
        updates: &SourceChanges,
        deletes: &SourceChanges,
    ) -> Result<(), StoreError> {
        if inserts.is_empty() && updates.is_empty() && deletes.is_empty() {
            return Ok(());
        }

        let inserted = encode("upsert sources", inserts)?;
        let updated = encode("upsert sources", updates)?;
        let deleted = encode("upsert sources", deletes)?;

        self.handle()
            .execute(
                "upsert sources",
                sqlx::query(UPSERT_SOURCES_QUERY)
                    .bind(inserted)
                    .bind(updated)
                    .bind(deleted),
            )
            .await?;

        if !deletes.is_empty() {
            let mut repo_ids: Vec<RepoId> = deletes.keys().copied().collect();
            repo_ids.sort_unstable();

            let orphaned = self
                .handle()
                .execute(
                    "delete orphaned repos",
                    sqlx::query(SOFT_DELETE_ORPHANS_QUERY).bind(repo_ids),
                )
                .await?;
            if orphaned.rows_affected() > 0 {
                tracing::info!(count = orphaned.rows_affected(), "soft-deleted orphaned repos");
            }
        }

        Ok(())
    }
}
