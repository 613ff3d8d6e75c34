#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use prometheus::Registry;
use sqlx::PgPool;
use tower::ServiceExt;

use repoupdater_db::{Store, StoreMetrics};
use repoupdater_worker::routes;
use repoupdater_worker::state::AppState;

/// Build the worker router plus a store whose metrics land on the same
/// registry `/metrics` serves.
pub fn build_test_app(pool: PgPool) -> (Router, Store) {
    let registry = Arc::new(Registry::new());
    let metrics = StoreMetrics::new(&registry).unwrap();
    let store = Store::new(pool.clone(), metrics);

    (routes::app(AppState { pool, registry }), store)
}

pub fn new_store(pool: &PgPool) -> Store {
    Store::new(pool.clone(), StoreMetrics::new(&Registry::new()).unwrap())
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
