//! Store for the `graphs` table (saved repository subsets).

use repoupdater_core::types::DbId;

use crate::error::StoreError;
use crate::handle::DbHandle;
use crate::models::graph::{CreateGraph, Graph, UpdateGraph};

/// Column list for `graphs` queries.
const COLUMNS: &str = "\
    id, owner_user_id, name::text AS name, description, spec, created_at, updated_at";

#[derive(Clone)]
pub struct GraphStore {
    handle: DbHandle,
}

impl GraphStore {
    pub fn new(handle: impl Into<DbHandle>) -> Self {
        Self {
            handle: handle.into(),
        }
    }

    /// Insert a new graph, returning the created row.
    pub async fn create_graph(&self, input: &CreateGraph) -> Result<Graph, StoreError> {
        let query = format!(
            "INSERT INTO graphs (owner_user_id, name, description, spec) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        self.handle
            .fetch_one(
                "create graph",
                sqlx::query_as::<_, Graph>(&query)
                    .bind(input.owner_user_id)
                    .bind(&input.name)
                    .bind(&input.description)
                    .bind(&input.spec),
            )
            .await
    }

    /// Find a graph by ID. Absent graphs are [`StoreError::NotFound`].
    pub async fn get_graph(&self, id: DbId) -> Result<Graph, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM graphs WHERE id = $1");
        self.handle
            .fetch_optional("get graph", sqlx::query_as::<_, Graph>(&query).bind(id))
            .await?
            .ok_or(StoreError::NotFound { entity: "graph", id })
    }

    /// All graphs owned by a user, by name.
    pub async fn list_graphs(&self, owner_user_id: DbId) -> Result<Vec<Graph>, StoreError> {
        let query = format!("SELECT {COLUMNS} FROM graphs WHERE owner_user_id = $1 ORDER BY name");
        self.handle
            .fetch_all(
                "list graphs",
                sqlx::query_as::<_, Graph>(&query).bind(owner_user_id),
            )
            .await
    }

    /// Update a graph. Only non-`None` fields in `input` are applied.
    pub async fn update_graph(&self, id: DbId, input: &UpdateGraph) -> Result<Graph, StoreError> {
        let query = format!(
            "UPDATE graphs SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                spec = COALESCE($4, spec), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        self.handle
            .fetch_optional(
                "update graph",
                sqlx::query_as::<_, Graph>(&query)
                    .bind(id)
                    .bind(&input.name)
                    .bind(&input.description)
                    .bind(&input.spec),
            )
            .await?
            .ok_or(StoreError::NotFound { entity: "graph", id })
    }

    /// Delete a graph.
    pub async fn delete_graph(&self, id: DbId) -> Result<(), StoreError> {
        let done = self
            .handle
            .execute(
                "delete graph",
                sqlx::query("DELETE FROM graphs WHERE id = $1").bind(id),
            )
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound { entity: "graph", id });
        }
        Ok(())
    }
}
