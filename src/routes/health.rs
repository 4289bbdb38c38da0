//! Service endpoints
//!
//! - GET /        - service descriptor
//! - GET /health  - liveness plus database reachability
//!
//! `/health` always answers 200; a database that does not answer is
//! reported as `degraded` rather than failing the probe.

use hyper::{Response, StatusCode};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::routes::common::{json_response, BoxBody};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

impl HealthResponse {
    pub fn from_database(connected: bool) -> Self {
        if connected {
            Self {
                status: "healthy",
                database: "connected",
            }
        } else {
            Self {
                status: "degraded",
                database: "disconnected",
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub version: &'static str,
    pub endpoints: BTreeMap<&'static str, &'static str>,
}

pub fn service_descriptor() -> ServiceDescriptor {
    let endpoints = BTreeMap::from([
        ("login", "POST /auth/login"),
        ("dossier_search", "GET /dossiers/search"),
        ("submit", "POST /topo-sync/"),
        ("staging_list", "GET /staging/"),
        ("staging_stats", "GET /staging/stats"),
        ("staging_detail", "GET /staging/{id}"),
        ("staging_validate", "PUT /staging/{id}/validate"),
        ("staging_file", "GET /staging/files/{import_id}/{stored_name}"),
        ("health", "GET /health"),
    ]);

    ServiceDescriptor {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        endpoints,
    }
}

pub async fn health_check(state: Arc<AppState>) -> Response<BoxBody> {
    let connected = state.staging_store.healthy().await;
    json_response(StatusCode::OK, &HealthResponse::from_database(connected))
}

pub fn root_descriptor() -> Response<BoxBody> {
    json_response(StatusCode::OK, &service_descriptor())
}
