//! Integration tests for `GraphStore`.

mod common;

use assert_matches::assert_matches;
use repoupdater_db::models::graph::{CreateGraph, UpdateGraph};
use repoupdater_db::StoreError;
use sqlx::PgPool;

use common::{create_user, new_store};

fn new_graph(owner_user_id: i64, name: &str) -> CreateGraph {
    CreateGraph {
        owner_user_id,
        name: name.to_string(),
        description: Some("saved subset".to_string()),
        spec: "github.com/foo/*\ngithub.com/bar/baz".to_string(),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_graph_crud(pool: PgPool) {
    let graphs = new_store(&pool).graph_store();
    let alice = create_user(&pool, "alice").await;

    let created = graphs.create_graph(&new_graph(alice, "backend")).await.unwrap();
    assert_eq!(graphs.get_graph(created.id).await.unwrap(), created);

    let updated = graphs
        .update_graph(
            created.id,
            &UpdateGraph {
                spec: Some("github.com/foo/*".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "backend");
    assert_eq!(updated.description.as_deref(), Some("saved subset"));
    assert_eq!(updated.spec, "github.com/foo/*");

    graphs.delete_graph(created.id).await.unwrap();
    let err = graphs.get_graph(created.id).await.unwrap_err();
    assert_matches!(err, StoreError::NotFound { entity: "graph", .. });
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_graphs_by_owner(pool: PgPool) {
    let graphs = new_store(&pool).graph_store();
    let alice = create_user(&pool, "alice").await;
    let bob = create_user(&pool, "bob").await;

    graphs.create_graph(&new_graph(alice, "zeta")).await.unwrap();
    graphs.create_graph(&new_graph(alice, "alpha")).await.unwrap();
    graphs.create_graph(&new_graph(bob, "other")).await.unwrap();

    let names: Vec<String> = graphs
        .list_graphs(alice)
        .await
        .unwrap()
        .into_iter()
        .map(|g| g.name)
        .collect();
    assert_eq!(names, vec!["alpha", "zeta"]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_graph_names_unique_per_owner(pool: PgPool) {
    let graphs = new_store(&pool).graph_store();
    let alice = create_user(&pool, "alice").await;

    graphs.create_graph(&new_graph(alice, "backend")).await.unwrap();
    let err = graphs
        .create_graph(&new_graph(alice, "BACKEND"))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_missing_graph_operations_are_not_found(pool: PgPool) {
    let graphs = new_store(&pool).graph_store();

    assert!(graphs.get_graph(99).await.unwrap_err().is_not_found());
    assert!(graphs
        .update_graph(99, &UpdateGraph::default())
        .await
        .unwrap_err()
        .is_not_found());
    assert!(graphs.delete_graph(99).await.unwrap_err().is_not_found());
}
