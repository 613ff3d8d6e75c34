//! JSON batch encoding for `upsert_repos`.
//!
//! A batch is an indented JSON array of [`RepoRecord`]s bound as one text
//! parameter. [`BATCH_CTE`] parses it back into rows; the column list in the
//! `AS (...)` clause must match the serde field names exactly.

use std::borrow::Cow;

use repoupdater_core::types::{RepoId, Timestamp};
use serde::Serialize;

use crate::error::StoreError;
use crate::models::repo::Repo;

/// Parses `$1` into the `batch` relation, numbered by input position.
pub(super) const BATCH_CTE: &str = "\
WITH batch AS (
  SELECT * FROM ROWS FROM (
    json_to_recordset($1::json)
    AS (
      id                    bigint,
      name                  citext,
      uri                   citext,
      description           text,
      created_at            timestamptz,
      updated_at            timestamptz,
      deleted_at            timestamptz,
      external_service_type text,
      external_service_id   text,
      external_id           text,
      archived              boolean,
      fork                  boolean,
      stars                 integer,
      private               boolean,
      metadata              jsonb
    )
  )
  WITH ORDINALITY
)";

/// One repository as it appears in a batch.
#[derive(Debug, Serialize)]
pub(super) struct RepoRecord<'a> {
    id: RepoId,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    uri: Option<&'a str>,
    description: &'a str,
    created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_service_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_service_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_id: Option<&'a str>,
    archived: bool,
    fork: bool,
    stars: i32,
    private: bool,
    metadata: Cow<'a, serde_json::Value>,
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

fn non_blank(s: &str) -> Option<&str> {
    (!s.trim().is_empty()).then_some(s)
}

impl<'a> From<&'a Repo> for RepoRecord<'a> {
    fn from(r: &'a Repo) -> Self {
        let metadata = if r.metadata.is_null() {
            Cow::Owned(serde_json::Value::Object(serde_json::Map::new()))
        } else {
            Cow::Borrowed(&r.metadata)
        };

        RepoRecord {
            id: r.id,
            name: &r.name,
            uri: r.uri.as_deref().and_then(non_blank),
            description: &r.description,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
            external_service_type: non_empty(&r.external_repo.service_type),
            external_service_id: non_empty(&r.external_repo.service_id),
            external_id: non_empty(&r.external_repo.id),
            archived: r.archived,
            fork: r.fork,
            stars: r.stars,
            private: r.private,
            metadata,
        }
    }
}

/// Encode the repos at `indices` as one batch parameter.
pub(super) fn encode(
    op: &'static str,
    repos: &[Repo],
    indices: &[usize],
) -> Result<String, StoreError> {
    let records: Vec<RepoRecord<'_>> = indices.iter().map(|&i| (&repos[i]).into()).collect();
    serde_json::to_string_pretty(&records).map_err(|source| StoreError::Marshal { op, source })
}

/// Positions of the input repos in each batch.
///
/// A live repo without an ID lands in both `updates` and `inserts`: the
/// update revives a soft-deleted row with the same external identity, the
/// insert creates the row when there is none.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct Partition {
    pub deletes: Vec<usize>,
    pub updates: Vec<usize>,
    pub inserts: Vec<usize>,
}

pub(super) fn partition(repos: &[Repo]) -> Partition {
    let mut batches = Partition::default();
    for (i, r) in repos.iter().enumerate() {
        if r.is_deleted() {
            batches.deletes.push(i);
        } else if r.id != 0 {
            batches.updates.push(i);
        } else {
            batches.updates.push(i);
            batches.inserts.push(i);
        }
    }
    batches
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use repoupdater_core::types::ExternalRepoSpec;

    use super::*;

    fn repo(name: &str, id: RepoId, deleted: bool) -> Repo {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut r = Repo::new(name, now);
        r.id = id;
        if deleted {
            r.deleted_at = Some(now);
        }
        r
    }

    #[test]
    fn partition_routes_new_repos_to_update_and_insert() {
        let repos = vec![
            repo("new", 0, false),
            repo("existing", 7, false),
            repo("gone", 8, true),
            repo("gone-unsaved", 0, true),
        ];

        let batches = partition(&repos);

        assert_eq!(batches.deletes, vec![2, 3]);
        assert_eq!(batches.updates, vec![0, 1]);
        assert_eq!(batches.inserts, vec![0]);
    }

    #[test]
    fn record_omits_empty_identity_and_defaults_metadata() {
        let mut r = repo("github.com/foo/bar", 0, false);
        r.uri = Some("  ".to_string());
        r.metadata = serde_json::Value::Null;

        let json = encode("insert", std::slice::from_ref(&r), &[0]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let record = &value[0];

        assert_eq!(record["name"], "github.com/foo/bar");
        assert_eq!(record["metadata"], serde_json::json!({}));
        assert!(record.get("uri").is_none());
        assert!(record.get("external_service_type").is_none());
        assert!(record.get("deleted_at").is_none());
    }

    #[test]
    fn record_keeps_blank_identity_parts() {
        let mut r = repo("github.com/foo/blank", 0, false);
        r.external_repo = ExternalRepoSpec::new(" ", "github", "https://github.com/");

        let json = encode("insert", std::slice::from_ref(&r), &[0]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["external_id"], " ");
    }

    #[test]
    fn record_carries_external_identity() {
        let mut r = repo("github.com/foo/bar", 3, false);
        r.external_repo = ExternalRepoSpec::new("MDEwOlJl", "github", "https://github.com/");
        r.stars = 12;

        let json = encode("update", std::slice::from_ref(&r), &[0]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let record = &value[0];

        assert_eq!(record["id"], 3);
        assert_eq!(record["external_id"], "MDEwOlJl");
        assert_eq!(record["external_service_type"], "github");
        assert_eq!(record["external_service_id"], "https://github.com/");
        assert_eq!(record["stars"], 12);
    }

    #[test]
    fn encode_keeps_index_order() {
        let repos = vec![repo("a", 0, false), repo("b", 0, false), repo("c", 0, false)];

        let json = encode("insert", &repos, &[2, 0]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["name"], "c");
        assert_eq!(value[1]["name"], "a");
    }
}
