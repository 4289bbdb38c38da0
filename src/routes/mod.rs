//! HTTP routes for the bridge

pub mod auth_routes;
pub mod common;
pub mod dossiers;
pub mod health;
pub mod staging;
pub mod sync;

pub use auth_routes::handle_login;
pub use common::{error_response, json_response, not_found_response, to_boxed, BoxBody};
pub use dossiers::handle_case_search;
pub use health::{health_check, root_descriptor};
pub use sync::handle_topo_sync;
