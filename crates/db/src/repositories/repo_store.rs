//! Store for the `repo` table and the sources attached to each row.

use repoupdater_core::error::CoreError;
use repoupdater_core::extsvc;
use repoupdater_core::types::RepoId;

use crate::error::StoreError;
use crate::handle::DbHandle;
use crate::models::repo::{Repo, RepoRow, ReposListOptions};

/// Column list for `repo r` queries. Sources only come from live services.
const COLUMNS: &str = "\
    r.id, r.name::text AS name, r.uri::text AS uri, r.description, \
    r.created_at, r.updated_at, r.deleted_at, \
    r.external_service_type, r.external_service_id, r.external_id, \
    r.archived, r.fork, r.private, r.stars, r.cloned, r.metadata, \
    (SELECT json_agg(json_build_object( \
                'kind', es.kind, \
                'external_service_id', esr.external_service_id, \
                'clone_url', esr.clone_url)) \
       FROM external_service_repos esr \
       JOIN external_services es \
         ON es.id = esr.external_service_id AND es.deleted_at IS NULL \
      WHERE esr.repo_id = r.id) AS sources";

/// Reads and writes individual repos outside the batch paths.
#[derive(Clone)]
pub struct RepoStore {
    handle: DbHandle,
}

impl RepoStore {
    pub fn new(handle: impl Into<DbHandle>) -> Self {
        Self {
            handle: handle.into(),
        }
    }

    /// Insert `repos` and their sources, assigning IDs in place.
    ///
    /// Every source key must be the URN of the service it names. Runs in
    /// its own transaction unless the store already is in one.
    pub async fn create(&self, repos: &mut [Repo]) -> Result<(), StoreError> {
        for r in repos.iter() {
            for (key, source) in &r.sources {
                if extsvc::parse_urn(key)? != source.external_service_id {
                    return Err(CoreError::Validation(format!(
                        "source {key} of repo {:?} points at external service {}",
                        r.name, source.external_service_id
                    ))
                    .into());
                }
            }
        }

        let tx = self.handle.begin_unless_in_transaction().await?;
        let result = insert_all(tx.as_ref().unwrap_or(&self.handle), repos).await;
        match tx {
            Some(tx) => tx.finish(result).await,
            None => result,
        }
    }

    /// Find a live repo by ID.
    pub async fn get(&self, id: RepoId) -> Result<Repo, StoreError> {
        let query =
            format!("SELECT {COLUMNS} FROM repo r WHERE r.id = $1 AND r.deleted_at IS NULL");
        self.handle
            .fetch_optional("get repo", sqlx::query_as::<_, RepoRow>(&query).bind(id))
            .await?
            .map(Repo::from)
            .ok_or(StoreError::NotFound { entity: "repo", id })
    }

    /// List live repos matching `opts`, ordered by ID.
    pub async fn list(&self, opts: &ReposListOptions) -> Result<Vec<Repo>, StoreError> {
        // Identity filters may be OR-ed together; the rest always narrow.
        let mut matches: Vec<String> = Vec::new();
        let mut conditions: Vec<String> = vec!["r.deleted_at IS NULL".to_string()];
        let mut bind_idx: u32 = 1;

        if !opts.names.is_empty() {
            matches.push(format!("r.name = ANY(${bind_idx}::citext[])"));
            bind_idx += 1;
        }
        if !opts.ids.is_empty() {
            matches.push(format!("r.id = ANY(${bind_idx})"));
            bind_idx += 1;
        }
        if !opts.service_types.is_empty() {
            matches.push(format!("LOWER(r.external_service_type) = ANY(${bind_idx})"));
            bind_idx += 1;
        }
        if !matches.is_empty() {
            let joiner = if opts.use_or { " OR " } else { " AND " };
            conditions.push(format!("({})", matches.join(joiner)));
        }

        if opts.external_service_id.is_some() {
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM external_service_repos esr \
                 WHERE esr.repo_id = r.id AND esr.external_service_id = ${bind_idx})"
            ));
            bind_idx += 1;
        }
        if opts.only_private {
            conditions.push("r.private".to_string());
        }
        if opts.only_cloned {
            conditions.push("r.cloned".to_string());
        }

        let mut query = format!(
            "SELECT {COLUMNS} FROM repo r WHERE {} ORDER BY r.id ASC",
            conditions.join(" AND ")
        );
        if opts.limit.is_some() {
            query.push_str(&format!(" LIMIT ${bind_idx}"));
            bind_idx += 1;
        }
        if opts.offset.is_some() {
            query.push_str(&format!(" OFFSET ${bind_idx}"));
        }

        let mut q = sqlx::query_as::<_, RepoRow>(&query);

        if !opts.names.is_empty() {
            q = q.bind(&opts.names);
        }
        if !opts.ids.is_empty() {
            q = q.bind(&opts.ids);
        }
        if !opts.service_types.is_empty() {
            let lowered: Vec<String> =
                opts.service_types.iter().map(|t| t.to_lowercase()).collect();
            q = q.bind(lowered);
        }
        if let Some(id) = opts.external_service_id {
            q = q.bind(id);
        }
        if let Some(limit) = opts.limit {
            q = q.bind(limit);
        }
        if let Some(offset) = opts.offset {
            q = q.bind(offset);
        }

        let rows = self.handle.fetch_all("list repos", q).await?;
        Ok(rows.into_iter().map(Repo::from).collect())
    }

    /// Soft-delete repos by ID and drop their sources.
    ///
    /// Returns the number of repos deleted. Already deleted IDs are skipped.
    pub async fn delete(&self, ids: &[RepoId]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let done = self
            .handle
            .execute(
                "delete repos",
                sqlx::query(
                    "WITH removed_sources AS ( \
                         DELETE FROM external_service_repos WHERE repo_id = ANY($1) \
                     ) \
                     UPDATE repo \
                     SET name = soft_deleted_repository_name(name), deleted_at = NOW() \
                     WHERE id = ANY($1) AND deleted_at IS NULL",
                )
                .bind(ids),
            )
            .await?;
        Ok(done.rows_affected())
    }
}

async fn insert_all(handle: &DbHandle, repos: &mut [Repo]) -> Result<(), StoreError> {
    for r in repos.iter_mut() {
        let spec = &r.external_repo;
        let id: RepoId = handle
            .fetch_scalar(
                "insert repo",
                sqlx::query_scalar::<_, RepoId>(
                    "INSERT INTO repo ( \
                         name, uri, description, created_at, updated_at, deleted_at, \
                         external_service_type, external_service_id, external_id, \
                         archived, fork, stars, private, cloned, metadata) \
                     VALUES ($1, NULLIF(BTRIM($2), ''), $3, $4, $5, $6, \
                             NULLIF($7, ''), NULLIF($8, ''), NULLIF($9, ''), \
                             $10, $11, $12, $13, $14, $15) \
                     RETURNING id",
                )
                .bind(&r.name)
                .bind(r.uri.as_deref().unwrap_or_default())
                .bind(&r.description)
                .bind(r.created_at)
                .bind(r.updated_at)
                .bind(r.deleted_at)
                .bind(&spec.service_type)
                .bind(&spec.service_id)
                .bind(&spec.id)
                .bind(r.archived)
                .bind(r.fork)
                .bind(r.stars)
                .bind(r.private)
                .bind(r.cloned)
                .bind(&r.metadata),
            )
            .await?;
        r.id = id;

        for source in r.sources.values() {
            handle
                .execute(
                    "insert repo source",
                    sqlx::query(
                        "INSERT INTO external_service_repos \
                             (external_service_id, repo_id, user_id, clone_url) \
                         SELECT es.id, $2, es.namespace_user_id, $3 \
                         FROM external_services es WHERE es.id = $1 \
                         ON CONFLICT ON CONSTRAINT uq_external_service_repos_repo_id_external_service_id \
                         DO UPDATE SET clone_url = EXCLUDED.clone_url",
                    )
                    .bind(source.external_service_id)
                    .bind(id)
                    .bind(&source.clone_url),
                )
                .await?;
        }
    }
    Ok(())
}
