//! Fixtures shared by the store integration tests.

#![allow(dead_code)]

use chrono::{SubsecRound, Utc};
use prometheus::Registry;
use repoupdater_core::extsvc;
use repoupdater_core::types::{DbId, ExternalRepoSpec, Timestamp};
use repoupdater_db::models::external_service::ExternalService;
use repoupdater_db::models::repo::{Repo, ReposListOptions};
use repoupdater_db::{Store, StoreMetrics};
use sqlx::PgPool;

/// A store with its own metrics registry.
pub fn new_store(pool: &PgPool) -> Store {
    let metrics = StoreMetrics::new(&Registry::new()).unwrap();
    Store::new(pool.clone(), metrics)
}

/// Current time at the precision Postgres stores.
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(6)
}

pub async fn create_user(pool: &PgPool, username: &str) -> DbId {
    sqlx::query_scalar::<_, DbId>("INSERT INTO users (username) VALUES ($1) RETURNING id")
        .bind(username)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn create_service(store: &Store, kind: &str, owner: Option<DbId>) -> ExternalService {
    let mut svc = ExternalService::new(kind, format!("{kind} connection"), now());
    svc.namespace_user_id = owner;
    store.external_service_store().create(&mut svc).await.unwrap();
    svc
}

/// An unsaved GitHub repo supplied by `svc`.
pub fn github_repo(name: &str, external_id: &str, svc: &ExternalService) -> Repo {
    let mut r = Repo::new(name, now());
    r.description = format!("{name} description");
    r.external_repo = ExternalRepoSpec::new(
        external_id,
        extsvc::kind_to_service_type(&svc.kind),
        "https://github.com/",
    );
    r.add_source(&svc.kind, svc.id, format!("https://{name}.git"));
    r
}

/// Live repos with the given IDs, by ID.
pub async fn list_by_ids(store: &Store, ids: &[DbId]) -> Vec<Repo> {
    store
        .repo_store()
        .list(&ReposListOptions {
            ids: ids.to_vec(),
            ..Default::default()
        })
        .await
        .unwrap()
}

/// Raw `(name, deleted_at IS NOT NULL)` of a row, including deleted ones.
pub async fn raw_repo(pool: &PgPool, id: DbId) -> (String, bool) {
    sqlx::query_as("SELECT name::text, deleted_at IS NOT NULL FROM repo WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}
