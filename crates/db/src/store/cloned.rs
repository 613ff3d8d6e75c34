//! Cloned-state tracking.

use tracing::Instrument;

use super::Store;
use crate::error::StoreError;
use crate::observability::Operation;

/// Flip `cloned` on for names in `$1` and off for everything else, writing
/// only rows whose flag changes.
const SET_CLONED_REPOS_QUERY: &str = "
WITH repo_names AS (
  SELECT unnest($1::text[])::citext AS name
),
cloned_repos AS (
  SELECT repo.id AS id FROM repo_names JOIN repo ON repo.name = repo_names.name
),
not_cloned AS (
  UPDATE repo SET cloned = false
  WHERE NOT EXISTS (SELECT FROM cloned_repos WHERE repo.id = cloned_repos.id)
  AND cloned
)
UPDATE repo
SET cloned = true
WHERE repo.id IN (SELECT id FROM cloned_repos)
AND NOT cloned";

impl Store {
    /// Replace the set of cloned repos with `names`, matched case-insensitively.
    ///
    /// Empty `names` marks every repo as not cloned.
    pub async fn set_cloned_repos(&self, names: &[String]) -> Result<(), StoreError> {
        let obs = self.observe(Operation::SetClonedRepos);

        let result = self
            .handle()
            .execute(
                "set cloned repos",
                sqlx::query(SET_CLONED_REPOS_QUERY).bind(names),
            )
            .instrument(obs.span().clone())
            .await
            .map(|done| {
                tracing::debug!(newly_cloned = done.rows_affected(), "cloned state updated");
            });

        obs.finish(names.len(), &result);
        result
    }
}
