//! Batched repo upserts.

use tracing::Instrument;

use super::batch::{self, BATCH_CTE};
use super::Store;
use crate::error::StoreError;
use crate::models::repo::Repo;
use crate::observability::Operation;

/// Soft-delete by ID. The name is mangled so it can be reused.
const DELETE_BODY: &str = "
UPDATE repo
SET
  name       = soft_deleted_repository_name(batch.name),
  deleted_at = batch.deleted_at
FROM batch
WHERE batch.deleted_at IS NOT NULL
AND repo.id = batch.id";

/// Overwrite every column except `cloned`, matching on external identity.
const UPDATE_BODY: &str = "
UPDATE repo
SET
  name                  = batch.name,
  uri                   = batch.uri,
  description           = batch.description,
  created_at            = batch.created_at,
  updated_at            = batch.updated_at,
  deleted_at            = batch.deleted_at,
  external_service_type = batch.external_service_type,
  external_service_id   = batch.external_service_id,
  external_id           = batch.external_id,
  archived              = batch.archived,
  fork                  = batch.fork,
  stars                 = batch.stars,
  private               = batch.private,
  metadata              = batch.metadata
FROM batch
WHERE repo.external_service_type = batch.external_service_type
AND repo.external_service_id = batch.external_service_id
AND repo.external_id = batch.external_id";

const INSERT_BODY: &str = "
INSERT INTO repo (
  name,
  uri,
  description,
  created_at,
  updated_at,
  deleted_at,
  external_service_type,
  external_service_id,
  external_id,
  archived,
  fork,
  stars,
  private,
  metadata
)
SELECT
  name,
  NULLIF(BTRIM(uri), ''),
  description,
  created_at,
  updated_at,
  deleted_at,
  external_service_type,
  external_service_id,
  external_id,
  archived,
  fork,
  stars,
  private,
  COALESCE(metadata, '{}')
FROM batch
ON CONFLICT (external_service_type, external_service_id, external_id) DO NOTHING";

/// Must run after the insert so it sees rows created by it.
const LIST_IDS_BODY: &str = "
SELECT batch.ordinality, repo.id
FROM batch
JOIN repo USING (external_service_type, external_service_id, external_id)";

fn statement(body: &str) -> String {
    format!("{BATCH_CTE}{body}")
}

impl Store {
    /// Insert, update or soft-delete `repos` in at most four statements.
    ///
    /// Repos with `deleted_at` set are soft-deleted by ID. Every other repo
    /// is written by external identity; new ones are inserted and get their
    /// ID assigned in place. `cloned` and sources are left alone, see
    /// [`Store::set_cloned_repos`] and [`Store::upsert_sources`].
    ///
    /// After success every live repo in `repos` has a non-zero ID, otherwise
    /// [`StoreError::MissingId`] is returned.
    pub async fn upsert_repos(&self, repos: &mut [Repo]) -> Result<(), StoreError> {
        let obs = self.observe(Operation::UpsertRepos);
        let count = repos.len();

        let result = self.batch_upsert_repos(repos).instrument(obs.span().clone()).await;

        obs.finish(count, &result);
        result
    }

    async fn batch_upsert_repos(&self, repos: &mut [Repo]) -> Result<(), StoreError> {
        if repos.is_empty() {
            return Ok(());
        }

        let batches = batch::partition(repos);

        // Encode everything first so a marshalling failure touches nothing.
        let mut statements = Vec::with_capacity(3);
        for (op, body, indices) in [
            ("delete", DELETE_BODY, &batches.deletes),
            ("update", UPDATE_BODY, &batches.updates),
            ("insert", INSERT_BODY, &batches.inserts),
        ] {
            if !indices.is_empty() {
                statements.push((op, statement(body), batch::encode(op, repos, indices)?));
            }
        }
        let inserted = if batches.inserts.is_empty() {
            None
        } else {
            Some(batch::encode("list", repos, &batches.inserts)?)
        };

        for (op, sql, json) in statements {
            let done = self.handle().execute(op, sqlx::query(&sql).bind(json)).await?;
            tracing::debug!(op, rows = done.rows_affected(), "batch applied");
        }

        if let Some(json) = inserted {
            let sql = statement(LIST_IDS_BODY);
            let ids: Vec<(i64, i64)> = self
                .handle()
                .fetch_all("list", sqlx::query_as::<_, (i64, i64)>(&sql).bind(json))
                .await?;

            for (ordinality, id) in ids {
                let position = usize::try_from(ordinality - 1).ok();
                if let Some(&i) = position.and_then(|p| batches.inserts.get(p)) {
                    repos[i].id = id;
                }
            }
        }

        if let Some(r) = repos.iter().find(|r| r.id == 0 && !r.is_deleted()) {
            return Err(StoreError::MissingId {
                name: r.name.clone(),
                spec: r.external_repo.clone(),
            });
        }

        Ok(())
    }
}
