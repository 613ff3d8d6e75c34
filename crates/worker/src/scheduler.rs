//! Periodic sync-job enqueuer.
//!
//! Every tick opens a transaction, enqueues a job for each external service
//! that is due and has none in flight, and commits. Failures are logged and
//! retried on the next tick.

use std::time::Duration;

use repoupdater_db::{Store, StoreError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Enqueue due sync jobs in one transaction. Returns the number enqueued.
pub async fn enqueue_once(store: &Store, ignore_site_admin: bool) -> Result<u64, StoreError> {
    let tx = store.transact().await?;
    let result = tx.enqueue_sync_jobs(ignore_site_admin).await;
    tx.done(result).await
}

/// Run the enqueuer every `interval` until `cancel` is triggered.
pub async fn run(
    store: Store,
    interval: Duration,
    ignore_site_admin: bool,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        ignore_site_admin,
        "Sync enqueuer started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Sync enqueuer stopping");
                break;
            }
            _ = ticker.tick() => {
                match enqueue_once(&store, ignore_site_admin).await {
                    Ok(0) => tracing::debug!("Sync enqueuer: nothing due"),
                    Ok(enqueued) => tracing::info!(enqueued, "Sync enqueuer: jobs enqueued"),
                    Err(e) => tracing::error!(error = %e, "Sync enqueuer: run failed"),
                }
            }
        }
    }
}
