//! Sync job models.

use std::fmt;
use std::str::FromStr;

use repoupdater_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// States a sync job moves through. Transitions are driven by the sync
/// worker; the store only ever creates `Queued` jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobState {
    Queued,
    Processing,
    Errored,
    Failed,
    Completed,
}

impl SyncJobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncJobState::Queued => "queued",
            SyncJobState::Processing => "processing",
            SyncJobState::Errored => "errored",
            SyncJobState::Failed => "failed",
            SyncJobState::Completed => "completed",
        }
    }

    /// Queued or processing jobs block new jobs for the same service.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, SyncJobState::Queued | SyncJobState::Processing)
    }
}

impl fmt::Display for SyncJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncJobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(SyncJobState::Queued),
            "processing" => Ok(SyncJobState::Processing),
            "errored" => Ok(SyncJobState::Errored),
            "failed" => Ok(SyncJobState::Failed),
            "completed" => Ok(SyncJobState::Completed),
            _ => Err(format!("unknown sync job state: {s}")),
        }
    }
}

/// A row from the `external_service_sync_jobs_with_next_sync_at` view.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SyncJob {
    pub id: DbId,
    pub state: String,
    pub failure_message: Option<String>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub process_after: Option<Timestamp>,
    pub num_resets: i32,
    pub num_failures: i32,
    pub external_service_id: DbId,
    pub next_sync_at: Option<Timestamp>,
}

impl SyncJob {
    /// Parsed state; `None` if the row holds a state this crate does not know.
    pub fn state(&self) -> Option<SyncJobState> {
        self.state.parse().ok()
    }
}
