//! Domain model structs.
//!
//! Row structs derive `FromRow`; value objects passed into the store are
//! plain structs owned by the caller.

pub mod external_service;
pub mod graph;
pub mod repo;
pub mod sync_job;
