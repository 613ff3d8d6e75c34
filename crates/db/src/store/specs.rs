//! External identities of stored repos.

use std::collections::HashSet;

use repoupdater_core::types::{ExternalRepoSpec, RepoId};
use tracing::Instrument;

use super::paginate::paginate;
use super::Store;
use crate::error::StoreError;
use crate::observability::Operation;

const LIST_EXTERNAL_REPO_SPECS_QUERY: &str = "\
    SELECT id, external_id, external_service_type, external_service_id \
    FROM repo \
    WHERE deleted_at IS NULL \
      AND external_id IS NOT NULL \
      AND external_service_type IS NOT NULL \
      AND external_service_id IS NOT NULL \
      AND id > $1 \
    ORDER BY id ASC \
    LIMIT $2";

type SpecRow = (RepoId, String, String, String);

impl Store {
    /// External identity of every live repo that has one.
    pub async fn list_external_repo_specs(&self) -> Result<HashSet<ExternalRepoSpec>, StoreError> {
        let obs = self.observe(Operation::ListExternalRepoSpecs);

        let mut specs = HashSet::new();
        let result = paginate(
            0,
            0,
            0,
            |cursor, limit| {
                self.handle().fetch_all(
                    "list external repo specs",
                    sqlx::query_as::<_, SpecRow>(LIST_EXTERNAL_REPO_SPECS_QUERY)
                        .bind(cursor)
                        .bind(limit),
                )
            },
            |(id, external_id, service_type, service_id)| {
                specs.insert(ExternalRepoSpec::new(external_id, service_type, service_id));
                id
            },
        )
        .instrument(obs.span().clone())
        .await;
        let result = result.map(|()| specs);

        obs.finish(result.as_ref().map_or(0, HashSet::len), &result);
        result
    }
}
