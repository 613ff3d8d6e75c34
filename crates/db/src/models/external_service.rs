//! External service models.

use repoupdater_core::extsvc;
use repoupdater_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A configured connection to a code host.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ExternalService {
    /// Assigned on insert; `0` until then.
    pub id: DbId,
    pub kind: String,
    pub display_name: String,
    pub config: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
    pub last_sync_at: Option<Timestamp>,
    pub next_sync_at: Option<Timestamp>,
    /// Owning user for user-added services; `None` for site-admin services.
    pub namespace_user_id: Option<DbId>,
}

impl ExternalService {
    pub fn new(kind: impl Into<String>, display_name: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: 0,
            kind: kind.into(),
            display_name: display_name.into(),
            config: serde_json::Value::Object(serde_json::Map::new()),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            last_sync_at: None,
            next_sync_at: None,
            namespace_user_id: None,
        }
    }

    /// `extsvc:<kind>:<id>`, the key of this service in a repo's sources.
    pub fn urn(&self) -> String {
        extsvc::urn(&self.kind, self.id)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Filters for `ExternalServiceStore::list`.
#[derive(Debug, Clone, Default)]
pub struct ExternalServicesListOptions {
    /// Matched case-insensitively.
    pub kinds: Vec<String>,
    pub namespace_user_id: Option<DbId>,
    pub include_deleted: bool,
}
