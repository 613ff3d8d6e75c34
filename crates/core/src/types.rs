use std::fmt;

use serde::{Deserialize, Serialize};

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Primary key of the `repo` table. Zero means "not yet assigned".
pub type RepoId = DbId;

/// Identity of a repository on the code host that supplies it.
///
/// The triple is unique across the `repo` table; it is how the upsert
/// engine matches incoming inventory against stored rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalRepoSpec {
    /// Code-host specific repository ID (e.g. a GitHub node ID).
    pub id: String,
    /// Kind of code host, e.g. `github`.
    pub service_type: String,
    /// Base URL of the code host, e.g. `https://github.com/`.
    pub service_id: String,
}

impl ExternalRepoSpec {
    pub fn new(
        id: impl Into<String>,
        service_type: impl Into<String>,
        service_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service_type: service_type.into(),
            service_id: service_id.into(),
        }
    }

    /// A spec is complete when all three parts are non-empty.
    ///
    /// Locally created repositories carry an empty spec.
    pub fn is_set(&self) -> bool {
        !self.id.is_empty() && !self.service_type.is_empty() && !self.service_id.is_empty()
    }
}

impl fmt::Display for ExternalRepoSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ExternalRepoSpec{{{} {} {}}}",
            self.service_id, self.service_type, self.id
        )
    }
}
