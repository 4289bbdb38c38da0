//! Staging review endpoints
//!
//! - GET /staging/                                   - list imports
//! - GET /staging/stats                              - counts by status, kind, district
//! - GET /staging/{id}                               - detail of one import
//! - PUT /staging/{id}/validate                      - accept or reject
//! - GET /staging/files/{import_id}/{stored_name}    - download an attachment

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::schemas::{EntityKind, ImportStatus};
use crate::routes::common::{
    authenticate, error_response, parse_json, parse_optional_i64, read_body, respond, to_boxed,
    BoxBody,
};
use crate::server::AppState;
use crate::staging::ledger::DEFAULT_LIST_LIMIT;
use crate::staging::{FileDownload, ListRequest, ReviewDecision};
use crate::types::{BridgeError, Result};

/// Raw list query; every value arrives as text so an empty `status` can mean "all"
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub entity_type: Option<String>,
    pub district_id: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ListQuery {
    pub fn parse(query: Option<&str>) -> Result<Self> {
        serde_urlencoded::from_str(query.unwrap_or(""))
            .map_err(|e| BridgeError::ValidationFailed(format!("Invalid query string: {}", e)))
    }

    pub fn into_request(self) -> Result<ListRequest> {
        let status = match self.status.as_deref().map(str::trim) {
            None => Some(ImportStatus::Pending),
            Some("") => None,
            Some(s) => Some(s.parse::<ImportStatus>().map_err(BridgeError::ValidationFailed)?),
        };

        let entity_type = match self.entity_type.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => Some(s.parse::<EntityKind>().map_err(BridgeError::ValidationFailed)?),
        };

        let limit = parse_optional_i64("limit", self.limit.as_deref())?
            .unwrap_or(DEFAULT_LIST_LIMIT as i64);
        let offset = parse_optional_i64("offset", self.offset.as_deref())?.unwrap_or(0);
        if limit < 0 || offset < 0 {
            return Err(BridgeError::ValidationFailed(
                "limit and offset must not be negative".to_string(),
            ));
        }

        Ok(ListRequest {
            status,
            entity_type,
            district_id: parse_optional_i64("district_id", self.district_id.as_deref())?,
            limit: limit as u64,
            offset: offset as u64,
        })
    }
}

/// Integer id from a path segment
pub fn parse_import_id(segment: &str) -> Result<i64> {
    segment
        .parse::<i64>()
        .map_err(|_| BridgeError::ValidationFailed(format!("Invalid import id: {}", segment)))
}

pub async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let result = async {
        let principal = authenticate(&state, &req).await?;
        let request = ListQuery::parse(req.uri().query())?.into_request()?;
        state.ledger.list(&principal, request).await
    }
    .await;

    respond(StatusCode::OK, result)
}

pub async fn handle_stats(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let result = async {
        let principal = authenticate(&state, &req).await?;
        state.ledger.stats(&principal).await
    }
    .await;

    respond(StatusCode::OK, result)
}

pub async fn handle_detail(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Response<BoxBody> {
    let result = async {
        let principal = authenticate(&state, &req).await?;
        let import_id = parse_import_id(id)?;
        state.ledger.detail(&principal, import_id).await
    }
    .await;

    respond(StatusCode::OK, result)
}

pub async fn handle_validate(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Response<BoxBody> {
    let result = async {
        let principal = authenticate(&state, &req).await?;
        let import_id = parse_import_id(id)?;
        let body = read_body(req).await?;
        let decision: ReviewDecision = parse_json(&body)?;
        state.ledger.decide(&principal, import_id, decision).await
    }
    .await;

    respond(StatusCode::OK, result)
}

pub async fn handle_file(
    req: Request<Incoming>,
    state: Arc<AppState>,
    import_id: &str,
    stored_name: &str,
) -> Response<BoxBody> {
    let result = async {
        let principal = authenticate(&state, &req).await?;
        let import_id = parse_import_id(import_id)?;
        state.ledger.file(&principal, import_id, stored_name).await
    }
    .await;

    match result {
        Ok(download) => to_boxed(file_response(download)),
        Err(e) => error_response(&e),
    }
}

fn file_response(download: FileDownload) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(download.bytes)));
    let headers = response.headers_mut();

    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(&download.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Ok(disposition) =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", download.stored_name))
    {
        headers.insert(CONTENT_DISPOSITION, disposition);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_defaults_to_pending() {
        let request = ListQuery::parse(None).unwrap().into_request().unwrap();
        assert_eq!(request.status, Some(ImportStatus::Pending));
        assert_eq!(request.limit, DEFAULT_LIST_LIMIT);
        assert_eq!(request.offset, 0);
    }

    #[test]
    fn test_empty_status_means_all() {
        let request = ListQuery::parse(Some("status=&entity_type=demandeur&district_id=5"))
            .unwrap()
            .into_request()
            .unwrap();
        assert_eq!(request.status, None);
        assert_eq!(request.entity_type, Some(EntityKind::Applicant));
        assert_eq!(request.district_id, Some(5));
    }

    #[test]
    fn test_list_query_rejects_bad_values() {
        for query in ["status=archived", "offset=-1", "limit=abc", "entity_type=parcel"] {
            let err = ListQuery::parse(Some(query))
                .unwrap()
                .into_request()
                .unwrap_err();
            assert!(matches!(err, BridgeError::ValidationFailed(_)), "{}", query);
        }
    }

    #[test]
    fn test_file_response_headers() {
        let response = file_response(FileDownload {
            stored_name: "0123456789abcdef0123456789abcdef.pdf".into(),
            mime_type: "application/pdf".into(),
            bytes: b"%PDF".to_vec(),
        });
        assert_eq!(response.headers()[CONTENT_TYPE], "application/pdf");
        assert_eq!(
            response.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"0123456789abcdef0123456789abcdef.pdf\""
        );
    }
}
