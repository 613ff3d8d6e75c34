//! Sync-job admission.
//!
//! A service gets a new job only when it is due and has no job queued or
//! processing. Both checks happen inside the `INSERT ... SELECT`, so one
//! statement decides admission for every service at once.

use repoupdater_core::extsvc::KIND_EXCLUDED_FROM_SYNC;
use repoupdater_core::types::DbId;
use tracing::Instrument;

use super::Store;
use crate::error::StoreError;
use crate::models::sync_job::SyncJob;
use crate::observability::Operation;

/// `$1` is the kind synced by its own worker. `{filter}` narrows the due set.
fn enqueue_sync_jobs_query(filter: &str) -> String {
    format!(
        "WITH due AS (
    SELECT id
    FROM external_services
    WHERE (next_sync_at <= clock_timestamp() OR next_sync_at IS NULL)
    AND deleted_at IS NULL
    AND LOWER(kind) != LOWER($1)
    AND {filter}
),
busy AS (
    SELECT DISTINCT external_service_id AS id
    FROM external_service_sync_jobs
    WHERE state = 'queued' OR state = 'processing'
)
INSERT INTO external_service_sync_jobs (external_service_id)
SELECT id FROM due EXCEPT SELECT id FROM busy"
    )
}

const ENQUEUE_SINGLE_SYNC_JOB_QUERY: &str = "\
    INSERT INTO external_service_sync_jobs (external_service_id) \
    SELECT $1 \
    WHERE NOT EXISTS ( \
        SELECT 1 FROM external_service_sync_jobs \
        WHERE external_service_id = $1 AND state IN ('queued', 'processing') \
    )";

const SYNC_JOB_COLUMNS: &str = "\
    id, state, failure_message, started_at, finished_at, process_after, \
    num_resets, num_failures, external_service_id, next_sync_at";

impl Store {
    /// Queue one sync job per due external service that has none in flight.
    ///
    /// With `ignore_site_admin` only services owned by a user are considered.
    /// Returns the number of jobs created.
    pub async fn enqueue_sync_jobs(&self, ignore_site_admin: bool) -> Result<u64, StoreError> {
        let obs = self.observe(Operation::EnqueueSyncJobs);

        let filter = if ignore_site_admin {
            "namespace_user_id IS NOT NULL"
        } else {
            "TRUE"
        };
        let query = enqueue_sync_jobs_query(filter);

        let result = self
            .handle()
            .execute(
                "enqueue sync jobs",
                sqlx::query(&query).bind(KIND_EXCLUDED_FROM_SYNC),
            )
            .instrument(obs.span().clone())
            .await
            .map(|done| done.rows_affected());

        let enqueued = result.as_ref().map_or(0, |&n| n as usize);
        obs.finish(enqueued, &result);
        result
    }

    /// Queue a sync job for one service unless it already has one in flight.
    ///
    /// Returns `true` when a job was created.
    pub async fn enqueue_single_sync_job(
        &self,
        external_service_id: DbId,
    ) -> Result<bool, StoreError> {
        let obs = self.observe(Operation::EnqueueSingleSyncJob);

        let result = self
            .handle()
            .execute(
                "enqueue single sync job",
                sqlx::query(ENQUEUE_SINGLE_SYNC_JOB_QUERY).bind(external_service_id),
            )
            .instrument(obs.span().clone())
            .await
            .map(|done| done.rows_affected() > 0);

        if let Ok(enqueued) = result {
            obs.span().in_scope(|| {
                tracing::debug!(external_service_id, enqueued, "enqueue single sync job");
            });
        }
        obs.finish(usize::from(matches!(result, Ok(true))), &result);
        result
    }

    /// Every sync job with its service's `next_sync_at`, oldest first.
    pub async fn list_sync_jobs(&self) -> Result<Vec<SyncJob>, StoreError> {
        let obs = self.observe(Operation::ListSyncJobs);

        let query = format!(
            "SELECT {SYNC_JOB_COLUMNS} \
             FROM external_service_sync_jobs_with_next_sync_at ORDER BY id"
        );
        let result = self
            .handle()
            .fetch_all("list sync jobs", sqlx::query_as::<_, SyncJob>(&query))
            .instrument(obs.span().clone())
            .await;

        obs.finish(result.as_ref().map_or(0, Vec::len), &result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_admin_filter_is_spliced_into_due_set() {
        let query = enqueue_sync_jobs_query("namespace_user_id IS NOT NULL");
        assert!(query.contains("AND namespace_user_id IS NOT NULL\n),"));
        assert!(query.contains("EXCEPT SELECT id FROM busy"));
    }
}
