//! Domain vocabulary shared by the repo-updater store and worker.
//!
//! Nothing in here touches the database: identifiers, external repository
//! identities, external-service kinds and their URNs.

pub mod error;
pub mod extsvc;
pub mod types;
