//! Repo-updater worker: periodically enqueues external-service sync jobs
//! and exposes health and Prometheus endpoints.

pub mod config;
pub mod routes;
pub mod scheduler;
pub mod state;
