//! Integration tests for the single-repo sync path of `Store`.

mod common;

use std::collections::BTreeSet;

use assert_matches::assert_matches;
use repoupdater_core::error::CoreError;
use repoupdater_core::extsvc::{KIND_GITHUB, KIND_GITLAB};
use repoupdater_core::types::DbId;
use repoupdater_db::observability::Operation;
use repoupdater_db::StoreError;
use sqlx::PgPool;

use common::{create_service, create_user, github_repo, list_by_ids, new_store, raw_repo};

/// `(external_service_id, user_id, clone_url)` of every edge of `repo_id`.
async fn edges(pool: &PgPool, repo_id: DbId) -> Vec<(DbId, Option<DbId>, String)> {
    sqlx::query_as::<_, (DbId, Option<DbId>, String)>(
        "SELECT external_service_id, user_id, clone_url FROM external_service_repos \
         WHERE repo_id = $1 ORDER BY external_service_id",
    )
    .bind(repo_id)
    .fetch_all(pool)
    .await
    .unwrap()
}

async fn count_repos(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM repo")
        .fetch_one(pool)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_inserts_repo_and_edge(pool: PgPool) {
    let store = new_store(&pool);
    let owner = create_user(&pool, "alice").await;
    let svc = create_service(&store, KIND_GITHUB, Some(owner)).await;

    let mut r = github_repo("github.com/foo/bar", "ext-1", &svc);
    r.metadata = serde_json::json!({"default_branch": "main"});
    store.create_external_service_repo(&svc, &mut r).await.unwrap();

    assert_ne!(r.id, 0);
    assert_eq!(list_by_ids(&store, &[r.id]).await, vec![r.clone()]);
    assert_eq!(
        edges(&pool, r.id).await,
        vec![(svc.id, Some(owner), "https://github.com/foo/bar.git".to_string())]
    );

    let metrics = store.metrics().get(Operation::CreateExternalServiceRepo);
    assert_eq!(metrics.observations(), 1);
    assert_eq!(metrics.errors(), 0.0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_site_admin_service_has_no_edge_user(pool: PgPool) {
    let store = new_store(&pool);
    let svc = create_service(&store, KIND_GITHUB, None).await;

    let mut r = github_repo("github.com/foo/bar", "ext-1", &svc);
    store.create_external_service_repo(&svc, &mut r).await.unwrap();

    let stored = edges(&pool, r.id).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].1, None);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_without_source_writes_nothing(pool: PgPool) {
    let store = new_store(&pool);
    let svc = create_service(&store, KIND_GITHUB, None).await;
    let other = create_service(&store, KIND_GITLAB, None).await;

    // Supplied by another service only.
    let mut r = github_repo("github.com/foo/bar", "ext-1", &other);
    let err = store.create_external_service_repo(&svc, &mut r).await.unwrap_err();

    assert_matches!(err, StoreError::Core(CoreError::Validation(_)));
    assert_eq!(r.id, 0);
    assert_eq!(count_repos(&pool).await, 0);
    assert_eq!(store.metrics().get(Operation::CreateExternalServiceRepo).errors(), 1.0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_with_duplicate_name_rolls_back(pool: PgPool) {
    let store = new_store(&pool);
    let svc = create_service(&store, KIND_GITHUB, None).await;

    let mut first = github_repo("github.com/foo/bar", "ext-1", &svc);
    store.create_external_service_repo(&svc, &mut first).await.unwrap();

    let mut second = github_repo("github.com/foo/bar", "ext-2", &svc);
    let err = store.create_external_service_repo(&svc, &mut second).await.unwrap_err();

    assert!(err.is_unique_violation(), "got {err}");
    assert_eq!(count_repos(&pool).await, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_joins_callers_transaction(pool: PgPool) {
    let store = new_store(&pool);
    let svc = create_service(&store, KIND_GITHUB, None).await;

    let tx = store.transact().await.unwrap();
    let mut r = github_repo("github.com/foo/bar", "ext-1", &svc);
    tx.create_external_service_repo(&svc, &mut r).await.unwrap();
    assert_ne!(r.id, 0);

    let abort: Result<(), StoreError> = Err(CoreError::Validation("abort".into()).into());
    tx.done(abort).await.unwrap_err();

    assert_eq!(count_repos(&pool).await, 0);
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_update_overwrites_repo_and_clone_url(pool: PgPool) {
    let store = new_store(&pool);
    let svc = create_service(&store, KIND_GITHUB, None).await;

    let mut r = github_repo("github.com/foo/bar", "ext-1", &svc);
    store.create_external_service_repo(&svc, &mut r).await.unwrap();

    r.description = "renamed upstream".to_string();
    r.stars = 99;
    r.add_source(&svc.kind, svc.id, "https://mirror.example.com/foo/bar.git");
    store.update_external_service_repo(&svc, &mut r).await.unwrap();

    assert!(r.updated_at.is_some());
    let listed = list_by_ids(&store, &[r.id]).await;
    assert_eq!(listed[0].description, "renamed upstream");
    assert_eq!(listed[0].stars, 99);
    assert_eq!(
        edges(&pool, r.id).await,
        vec![(svc.id, None, "https://mirror.example.com/foo/bar.git".to_string())]
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_update_revives_deleted_repo(pool: PgPool) {
    let store = new_store(&pool);
    let svc = create_service(&store, KIND_GITHUB, None).await;

    let mut r = github_repo("github.com/foo/bar", "ext-1", &svc);
    store.create_external_service_repo(&svc, &mut r).await.unwrap();
    store.delete_external_service_repo(&svc, r.id).await.unwrap();
    assert!(raw_repo(&pool, r.id).await.1, "repo should be soft-deleted");

    store.update_external_service_repo(&svc, &mut r).await.unwrap();

    assert_eq!(raw_repo(&pool, r.id).await, ("github.com/foo/bar".to_string(), false));
    assert_eq!(edges(&pool, r.id).await.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_update_records_owner_change(pool: PgPool) {
    let store = new_store(&pool);
    let mut svc = create_service(&store, KIND_GITHUB, None).await;

    let mut r = github_repo("github.com/foo/bar", "ext-1", &svc);
    store.create_external_service_repo(&svc, &mut r).await.unwrap();

    let owner = create_user(&pool, "bob").await;
    svc.namespace_user_id = Some(owner);
    store.update_external_service_repo(&svc, &mut r).await.unwrap();

    assert_eq!(edges(&pool, r.id).await[0].1, Some(owner));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_update_requires_id(pool: PgPool) {
    let store = new_store(&pool);
    let svc = create_service(&store, KIND_GITHUB, None).await;

    let mut r = github_repo("github.com/foo/bar", "ext-1", &svc);
    let err = store.update_external_service_repo(&svc, &mut r).await.unwrap_err();

    assert_matches!(err, StoreError::Core(CoreError::Validation(_)));
    assert_eq!(count_repos(&pool).await, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_update_unknown_id_is_not_found(pool: PgPool) {
    let store = new_store(&pool);
    let svc = create_service(&store, KIND_GITHUB, None).await;

    let mut r = github_repo("github.com/foo/bar", "ext-1", &svc);
    r.id = 4242;
    let err = store.update_external_service_repo(&svc, &mut r).await.unwrap_err();

    assert!(err.is_not_found(), "got {err}");
    assert!(edges(&pool, 4242).await.is_empty());
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_delete_keeps_repo_with_other_source(pool: PgPool) {
    let store = new_store(&pool);
    let github = create_service(&store, KIND_GITHUB, None).await;
    let mirror = create_service(&store, KIND_GITHUB, None).await;

    let mut r = github_repo("github.com/foo/bar", "ext-1", &github);
    store.create_external_service_repo(&github, &mut r).await.unwrap();
    r.add_source(&mirror.kind, mirror.id, "https://mirror.example.com/foo/bar.git");
    store.update_external_service_repo(&mirror, &mut r).await.unwrap();

    store.delete_external_service_repo(&github, r.id).await.unwrap();

    assert!(!raw_repo(&pool, r.id).await.1, "repo still has a source");
    let stored = edges(&pool, r.id).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].0, mirror.id);

    store.delete_external_service_repo(&mirror, r.id).await.unwrap();

    let (name, deleted) = raw_repo(&pool, r.id).await;
    assert!(deleted);
    assert!(name.starts_with("DELETED-"), "name {name} should be freed");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_delete_missing_edge_is_noop(pool: PgPool) {
    let store = new_store(&pool);
    let svc = create_service(&store, KIND_GITHUB, None).await;

    store.delete_external_service_repo(&svc, 4242).await.unwrap();
    assert_eq!(store.metrics().get(Operation::DeleteExternalServiceRepo).errors(), 0.0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_delete_not_in_unlinks_the_rest(pool: PgPool) {
    let store = new_store(&pool);
    let svc = create_service(&store, KIND_GITHUB, None).await;
    let other = create_service(&store, KIND_GITLAB, None).await;

    let mut ids = Vec::new();
    for (name, external_id) in [
        ("github.com/a/a", "1"),
        ("github.com/b/b", "2"),
        ("github.com/c/c", "3"),
    ] {
        let mut r = github_repo(name, external_id, &svc);
        store.create_external_service_repo(&svc, &mut r).await.unwrap();
        ids.push(r.id);
    }
    let mut unrelated = github_repo("gitlab.com/d/d", "4", &other);
    store.create_external_service_repo(&other, &mut unrelated).await.unwrap();

    let keep = BTreeSet::from([ids[1]]);
    let deleted = store.delete_external_service_repos_not_in(&svc, &keep).await.unwrap();

    assert_eq!(deleted, vec![ids[0], ids[2]]);
    assert!(raw_repo(&pool, ids[0]).await.1);
    assert!(!raw_repo(&pool, ids[1]).await.1);
    assert!(raw_repo(&pool, ids[2]).await.1);
    assert!(!raw_repo(&pool, unrelated.id).await.1);

    let metrics = store.metrics().get(Operation::DeleteExternalServiceReposNotIn);
    assert_eq!(metrics.count(), 2.0);
    assert_eq!(store.metrics().get(Operation::DeleteExternalServiceRepo).observations(), 2);

    // Nothing left to unlink.
    let again = store.delete_external_service_repos_not_in(&svc, &keep).await.unwrap();
    assert!(again.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_delete_not_in_with_empty_set_unlinks_everything(pool: PgPool) {
    let store = new_store(&pool);
    let svc = create_service(&store, KIND_GITHUB, None).await;

    let mut r = github_repo("github.com/foo/bar", "ext-1", &svc);
    store.create_external_service_repo(&svc, &mut r).await.unwrap();

    let deleted = store
        .delete_external_service_repos_not_in(&svc, &BTreeSet::new())
        .await
        .unwrap();

    assert_eq!(deleted, vec![r.id]);
    assert!(edges(&pool, r.id).await.is_empty());
}
