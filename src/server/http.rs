//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling. Every route is served
//! both bare and under `/api/v1`, with or without a trailing slash.

use hyper::body::Incoming;
use hyper::header::{
    HeaderMap, HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE, ORIGIN, VARY,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::artifacts::ArtifactStore;
use crate::auth::{DualAuthorityResolver, TokenAuthority};
use crate::cases::CaseSearch;
use crate::config::Args;
use crate::db::{IdentityDirectory, RegistryReader, StagingStore};
use crate::routes::{self, common::full_response, BoxBody};
use crate::staging::StagingLedger;
use crate::types::{BridgeError, Result};

/// Prefix under which every route is mounted a second time
pub const API_PREFIX: &str = "/api/v1";

const CORS_METHODS: &str = "GET, POST, PUT, OPTIONS";
const CORS_HEADERS: &str = "Authorization, Content-Type";

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Bearer token resolution for both trust domains
    pub resolver: DualAuthorityResolver,
    /// Field-system accounts (login)
    pub directory: Arc<dyn IdentityDirectory>,
    pub staging_store: Arc<dyn StagingStore>,
    pub ledger: StagingLedger,
    pub cases: CaseSearch,
    pub artifacts: Arc<ArtifactStore>,
    /// Parsed `CORS_ORIGINS`
    pub cors_origins: Vec<String>,
}

impl AppState {
    /// Wire the services over a set of storage backends
    pub fn with_stores(
        args: Args,
        directory: Arc<dyn IdentityDirectory>,
        registry: Arc<dyn RegistryReader>,
        staging_store: Arc<dyn StagingStore>,
    ) -> Result<Self> {
        let algorithm = args.algorithm().map_err(BridgeError::Config)?;
        let ttl = Duration::from_secs(args.token_ttl_seconds());

        let resolver = DualAuthorityResolver::new(
            TokenAuthority::new(args.field_secret(), algorithm, ttl)?,
            TokenAuthority::new(args.registry_secret(), algorithm, ttl)?,
            Arc::clone(&directory),
        );

        let artifacts = Arc::new(ArtifactStore::new(
            &args.upload_dir,
            args.max_file_size_bytes(),
        ));

        let ledger = StagingLedger::new(
            Arc::clone(&registry),
            Arc::clone(&staging_store),
            Arc::clone(&artifacts),
        );

        Ok(Self {
            cors_origins: args.cors_origin_list(),
            cases: CaseSearch::new(registry),
            args,
            resolver,
            directory,
            staging_store,
            ledger,
            artifacts,
        })
    }
}

pub async fn run(state: Arc<AppState>) -> Result<()> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("Bridge listening on {}", state.args.listen);

    if state.args.dev_mode {
        warn!("Development mode enabled - default signing secrets may be in use");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = normalize_path(req.uri().path());
    let origin = req.headers().get(ORIGIN).cloned();

    debug!("[{}] {} {}", addr, method, path);

    let decoded = path_segments(&path);
    let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();

    let mut response = match (&method, segments.as_slice()) {
        // CORS preflight
        (&Method::OPTIONS, _) => preflight_response(),

        (&Method::GET, [""]) => routes::root_descriptor(),
        (&Method::GET, ["health"]) => routes::health_check(Arc::clone(&state)).await,

        (&Method::POST, ["auth", "login"]) => routes::handle_login(req, Arc::clone(&state)).await,

        (&Method::GET, ["dossiers", "search"]) => {
            routes::handle_case_search(req, Arc::clone(&state)).await
        }

        (&Method::POST, ["topo-sync"]) => routes::handle_topo_sync(req, Arc::clone(&state)).await,

        // Staging review; `stats` and `files` must win over `{id}`
        (&Method::GET, ["staging"]) => routes::staging::handle_list(req, Arc::clone(&state)).await,
        (&Method::GET, ["staging", "stats"]) => {
            routes::staging::handle_stats(req, Arc::clone(&state)).await
        }
        (&Method::GET, ["staging", "files", import_id, stored_name]) => {
            routes::staging::handle_file(req, Arc::clone(&state), import_id, stored_name).await
        }
        (&Method::GET, ["staging", id]) => {
            routes::staging::handle_detail(req, Arc::clone(&state), id).await
        }
        (&Method::PUT, ["staging", id, "validate"]) => {
            routes::staging::handle_validate(req, Arc::clone(&state), id).await
        }

        _ => routes::not_found_response(&path),
    };

    if let Some(origin) = origin {
        apply_cors(response.headers_mut(), &origin, &state.cors_origins);
    }

    Ok(response)
}

/// Strip the API prefix and any trailing slash
pub fn normalize_path(path: &str) -> String {
    let rest = match path.strip_prefix(API_PREFIX) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    };

    let trimmed = rest.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Percent-decoded path segments
fn path_segments(path: &str) -> Vec<String> {
    path.trim_start_matches('/')
        .split('/')
        .map(|segment| {
            urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string())
        })
        .collect()
}

/// Value for `Access-Control-Allow-Origin`, if the origin is allowed
pub fn allowed_origin(origin: &HeaderValue, allowed: &[String]) -> Option<HeaderValue> {
    if allowed.iter().any(|a| a == "*") {
        return Some(HeaderValue::from_static("*"));
    }

    let origin_str = origin.to_str().ok()?;
    allowed
        .iter()
        .any(|a| a == origin_str)
        .then(|| origin.clone())
}

fn apply_cors(headers: &mut HeaderMap, origin: &HeaderValue, allowed: &[String]) {
    let Some(allow) = allowed_origin(origin, allowed) else {
        return;
    };

    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, allow);
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(CORS_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(CORS_HEADERS));
    headers.insert(VARY, HeaderValue::from_static("Origin"));
}

/// CORS preflight response; allow headers are added once the origin checks out
fn preflight_response() -> Response<BoxBody> {
    let mut response = full_response(StatusCode::NO_CONTENT, "text/plain", "");
    response
        .headers_mut()
        .insert(ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    routes::to_boxed(response)
}
