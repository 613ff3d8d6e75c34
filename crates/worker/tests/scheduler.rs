//! Integration tests for the sync-job enqueuer loop.

mod common;

use std::time::Duration;

use chrono::Utc;
use repoupdater_core::extsvc::KIND_GITHUB;
use repoupdater_db::models::external_service::ExternalService;
use repoupdater_db::Store;
use repoupdater_worker::scheduler;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use common::new_store;

async fn due_service(store: &Store, owner: Option<i64>) -> ExternalService {
    let mut svc = ExternalService::new(KIND_GITHUB, "github", Utc::now());
    svc.namespace_user_id = owner;
    store.external_service_store().create(&mut svc).await.unwrap();
    svc
}

async fn job_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM external_service_sync_jobs")
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_once_commits_jobs(pool: PgPool) {
    let store = new_store(&pool);
    due_service(&store, None).await;

    assert_eq!(scheduler::enqueue_once(&store, false).await.unwrap(), 1);
    // The first job is still queued, so nothing new is admitted.
    assert_eq!(scheduler::enqueue_once(&store, false).await.unwrap(), 0);
    assert_eq!(job_count(&pool).await, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn enqueue_once_honours_ignore_site_admin(pool: PgPool) {
    let store = new_store(&pool);
    let user_id: i64 =
        sqlx::query_scalar::<_, i64>("INSERT INTO users (username) VALUES ('alice') RETURNING id")
            .fetch_one(&pool)
            .await
            .unwrap();
    due_service(&store, None).await;
    due_service(&store, Some(user_id)).await;

    assert_eq!(scheduler::enqueue_once(&store, true).await.unwrap(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn run_enqueues_until_cancelled(pool: PgPool) {
    let store = new_store(&pool);
    due_service(&store, None).await;

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler::run(
        store,
        Duration::from_millis(20),
        false,
        cancel.clone(),
    ));

    // The first tick fires immediately.
    let mut jobs = 0;
    for _ in 0..100 {
        jobs = job_count(&pool).await;
        if jobs > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(jobs, 1);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("enqueuer did not stop")
        .unwrap();
}
