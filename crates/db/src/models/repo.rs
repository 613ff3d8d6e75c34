//! Repository models.

use std::collections::{BTreeMap, HashMap};

use repoupdater_core::extsvc;
use repoupdater_core::types::{DbId, ExternalRepoSpec, RepoId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// A repository known to the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repo {
    /// Assigned by the store on insert; `0` until then.
    pub id: RepoId,
    /// Unique among live repositories, compared case-insensitively.
    pub name: String,
    pub uri: Option<String>,
    pub description: String,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
    /// Soft-delete marker. `None` means live.
    pub deleted_at: Option<Timestamp>,
    /// Empty for repositories created locally rather than synced.
    pub external_repo: ExternalRepoSpec,
    pub archived: bool,
    pub fork: bool,
    pub private: bool,
    pub stars: i32,
    /// Only written by `Store::set_cloned_repos`.
    pub cloned: bool,
    pub metadata: serde_json::Value,
    /// Sources keyed by external-service URN.
    pub sources: BTreeMap<String, SourceInfo>,
}

impl Repo {
    /// A new, unsaved repository.
    pub fn new(name: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id: 0,
            name: name.into(),
            uri: None,
            description: String::new(),
            created_at,
            updated_at: None,
            deleted_at: None,
            external_repo: ExternalRepoSpec::default(),
            archived: false,
            fork: false,
            private: false,
            stars: 0,
            cloned: false,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            sources: BTreeMap::new(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Record that the external service `(kind, id)` supplies this repo.
    pub fn add_source(
        &mut self,
        kind: &str,
        external_service_id: DbId,
        clone_url: impl Into<String>,
    ) {
        self.sources.insert(
            extsvc::urn(kind, external_service_id),
            SourceInfo {
                external_service_id,
                clone_url: clone_url.into(),
            },
        );
    }

    /// Sources as a flat list, in URN order.
    pub fn source_list(&self) -> Vec<SourceInfo> {
        self.sources.values().cloned().collect()
    }
}

/// Edge between a repository and an external service that supplies it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceInfo {
    pub external_service_id: DbId,
    pub clone_url: String,
}

/// Sources of every repository, keyed by repository ID.
///
/// Repositories without an ID yet are skipped.
pub fn sources_by_repo(repos: &[Repo]) -> HashMap<RepoId, Vec<SourceInfo>> {
    repos
        .iter()
        .filter(|r| r.id != 0 && !r.sources.is_empty())
        .map(|r| (r.id, r.source_list()))
        .collect()
}

/// Raw `repo` row plus its aggregated sources, as read by `RepoStore`.
#[derive(Debug, FromRow)]
pub(crate) struct RepoRow {
    pub id: RepoId,
    pub name: String,
    pub uri: Option<String>,
    pub description: String,
    pub created_at: Timestamp,
    pub updated_at: Option<Timestamp>,
    pub deleted_at: Option<Timestamp>,
    pub external_service_type: Option<String>,
    pub external_service_id: Option<String>,
    pub external_id: Option<String>,
    pub archived: bool,
    pub fork: bool,
    pub private: bool,
    pub stars: i32,
    pub cloned: bool,
    pub metadata: serde_json::Value,
    pub sources: Option<Json<Vec<SourceRow>>>,
}

/// One element of the `sources` JSON aggregate.
#[derive(Debug, Deserialize)]
pub(crate) struct SourceRow {
    pub kind: String,
    pub external_service_id: DbId,
    pub clone_url: String,
}

impl From<RepoRow> for Repo {
    fn from(row: RepoRow) -> Self {
        let sources = row
            .sources
            .map(|Json(rows)| {
                rows.into_iter()
                    .map(|s| {
                        (
                            extsvc::urn(&s.kind, s.external_service_id),
                            SourceInfo {
                                external_service_id: s.external_service_id,
                                clone_url: s.clone_url,
                            },
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Repo {
            id: row.id,
            name: row.name,
            uri: row.uri,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            external_repo: ExternalRepoSpec {
                id: row.external_id.unwrap_or_default(),
                service_type: row.external_service_type.unwrap_or_default(),
                service_id: row.external_service_id.unwrap_or_default(),
            },
            archived: row.archived,
            fork: row.fork,
            private: row.private,
            stars: row.stars,
            cloned: row.cloned,
            metadata: row.metadata,
            sources,
        }
    }
}

/// Filters for `RepoStore::list`.
///
/// Empty filters match everything. Soft-deleted repositories are never
/// returned.
#[derive(Debug, Clone, Default)]
pub struct ReposListOptions {
    pub names: Vec<String>,
    pub ids: Vec<RepoId>,
    /// Matched case-insensitively against `external_service_type`.
    pub service_types: Vec<String>,
    /// Only repositories supplied by this external service.
    pub external_service_id: Option<DbId>,
    pub only_private: bool,
    pub only_cloned: bool,
    /// Combine `names`, `ids` and `service_types` with OR instead of AND.
    pub use_or: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
