//! Repo counters.

use repoupdater_core::types::DbId;
use tracing::Instrument;

use super::Store;
use crate::error::StoreError;
use crate::observability::Operation;

const COUNT_NOT_CLONED_QUERY: &str =
    "SELECT COUNT(*) FROM repo WHERE deleted_at IS NULL AND NOT cloned";

const COUNT_USER_ADDED_QUERY: &str = "\
    SELECT COUNT(DISTINCT repo_id) FROM external_service_repos \
    WHERE user_id IS NOT NULL";

impl Store {
    /// Number of live repos that are not cloned yet.
    pub async fn count_not_cloned_repos(&self) -> Result<i64, StoreError> {
        let obs = self.observe(Operation::CountNotClonedRepos);

        let result = self
            .handle()
            .fetch_scalar(
                "count not cloned repos",
                sqlx::query_scalar::<_, i64>(COUNT_NOT_CLONED_QUERY),
            )
            .instrument(obs.span().clone())
            .await;

        obs.finish(count_of(&result), &result);
        result
    }

    /// Number of distinct repos supplied by user-owned external services.
    ///
    /// With a non-empty `user_ids` only sources owned by those users count.
    pub async fn count_user_added_repos(&self, user_ids: &[DbId]) -> Result<i64, StoreError> {
        let obs = self.observe(Operation::CountUserAddedRepos);

        let query = if user_ids.is_empty() {
            COUNT_USER_ADDED_QUERY.to_string()
        } else {
            format!("{COUNT_USER_ADDED_QUERY} AND user_id = ANY($1)")
        };
        let mut scalar = sqlx::query_scalar::<_, i64>(&query);
        if !user_ids.is_empty() {
            scalar = scalar.bind(user_ids);
        }

        let result = self
            .handle()
            .fetch_scalar("count user added repos", scalar)
            .instrument(obs.span().clone())
            .await;

        obs.finish(count_of(&result), &result);
        result
    }
}

fn count_of(result: &Result<i64, StoreError>) -> usize {
    result
        .as_ref()
        .map(|&n| usize::try_from(n).unwrap_or_default())
        .unwrap_or_default()
}
