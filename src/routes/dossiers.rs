//! GET /dossiers/search - case lookup for both field and registry users

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

use crate::cases::CaseSearchRequest;
use crate::routes::common::{authenticate, parse_query, respond, BoxBody};
use crate::server::AppState;

pub async fn handle_case_search(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let result = async {
        let principal = authenticate(&state, &req).await?;
        let request: CaseSearchRequest = parse_query(req.uri().query())?;
        state.cases.search(&principal, request).await
    }
    .await;

    respond(StatusCode::OK, result)
}
