//! Saved repository subsets ("graphs").

use repoupdater_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `graphs` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Graph {
    pub id: DbId,
    pub owner_user_id: DbId,
    pub name: String,
    pub description: Option<String>,
    /// Repository selection, one pattern per line.
    pub spec: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a graph.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGraph {
    pub owner_user_id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub spec: String,
}

/// DTO for updating a graph. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGraph {
    pub name: Option<String>,
    pub description: Option<String>,
    pub spec: Option<String>,
}
