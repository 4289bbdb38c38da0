//! Topo Bridge - staging gateway between TopoManager and GeODOC
//!
//! Field operators submit property and applicant records from TopoManager.
//! The bridge stages each submission, flags likely duplicates of registry
//! records, and holds it for a GeODOC reviewer of the target district to
//! accept or reject.
//!
//! ## Services
//!
//! - **Auth**: field-system login, bearer tokens from either trust domain
//! - **Cases**: district-scoped dossier search
//! - **Staging**: submit, list, review, and download staged imports
//! - **Artifacts**: fingerprinted storage for submitted documents

pub mod artifacts;
pub mod auth;
pub mod cases;
pub mod config;
pub mod db;
pub mod matcher;
pub mod routes;
pub mod server;
pub mod staging;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{BridgeError, Result};
