//! Response and request helpers shared by the route handlers

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error};

use crate::auth::Principal;
use crate::server::AppState;
use crate::types::{BridgeError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Convert a Full<Bytes> body to BoxBody
pub fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// Response with a fixed content type
pub fn full_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    match serde_json::to_vec(body) {
        Ok(json) => to_boxed(full_response(status, "application/json", json)),
        Err(e) => error_response(&BridgeError::Internal(format!("Response encoding failed: {}", e))),
    }
}

pub fn error_response(err: &BridgeError) -> Response<BoxBody> {
    if err.is_client_error() {
        debug!(code = err.code(), error = %err, "Request rejected");
    } else {
        error!(code = err.code(), error = %err, "Request failed");
    }

    let body = ErrorResponse {
        error: err.public_message(),
        code: err.code(),
    };
    let json = serde_json::to_vec(&body).unwrap_or_default();
    to_boxed(full_response(err.status_code(), "application/json", json))
}

/// JSON body on success, error body otherwise
pub fn respond<T: Serialize>(status: StatusCode, result: Result<T>) -> Response<BoxBody> {
    match result {
        Ok(body) => json_response(status, &body),
        Err(e) => error_response(&e),
    }
}

pub fn not_found_response(path: &str) -> Response<BoxBody> {
    error_response(&BridgeError::NotFound(format!("No route for {}", path)))
}

/// Collect the whole request body
pub async fn read_body(req: Request<Incoming>) -> Result<Bytes> {
    Ok(req.into_body().collect().await?.to_bytes())
}

/// Deserialize a JSON request body
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| BridgeError::ValidationFailed(format!("Invalid request body: {}", e)))
}

/// Deserialize a query string; parameters with empty values count as absent
pub fn parse_query<T: DeserializeOwned>(query: Option<&str>) -> Result<T> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.unwrap_or(""))
        .map_err(|e| BridgeError::ValidationFailed(format!("Invalid query string: {}", e)))?;

    let kept: Vec<(String, String)> = pairs.into_iter().filter(|(_, v)| !v.is_empty()).collect();
    let normalized = serde_urlencoded::to_string(&kept)
        .map_err(|e| BridgeError::Internal(format!("Query re-encoding failed: {}", e)))?;

    serde_urlencoded::from_str(&normalized)
        .map_err(|e| BridgeError::ValidationFailed(format!("Invalid query parameter: {}", e)))
}

/// Parse an optional integer parameter by name
pub fn parse_optional_i64(name: &str, value: Option<&str>) -> Result<Option<i64>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse::<i64>()
            .map(Some)
            .map_err(|_| BridgeError::ValidationFailed(format!("{} must be an integer", name))),
    }
}

/// Resolve the caller from the `Authorization` header
pub async fn authenticate<B>(state: &AppState, req: &Request<B>) -> Result<Principal> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    state.resolver.resolve_header(header).await
}
