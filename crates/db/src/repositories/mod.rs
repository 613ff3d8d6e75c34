//! CRUD stores over single tables.
//!
//! Each store wraps a [`DbHandle`](crate::handle::DbHandle) so it runs on
//! the pool or inside the transaction of the [`Store`](crate::Store) that
//! created it.

pub mod external_service_store;
pub mod graph_store;
pub mod repo_store;

pub use external_service_store::ExternalServiceStore;
pub use graph_store::GraphStore;
pub use repo_store::RepoStore;
