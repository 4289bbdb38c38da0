//! Field-system login
//!
//! - POST /auth/login - Verify TopoManager credentials and issue a bearer token
//!
//! Registry-system users log in through GeODOC itself; the bridge only
//! verifies their tokens.

use bson::DateTime;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{parse_allowed_districts, verify_password, TokenAuthority, TokenInput, TrustDomain};
use crate::db::IdentityDirectory;
use crate::routes::common::{parse_json, read_body, respond, BoxBody};
use crate::server::AppState;
use crate::types::{BridgeError, Result};

const USERNAME_CHARS: std::ops::RangeInclusive<usize> = 3..=50;
const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    fn validate(&self) -> Result<()> {
        if !USERNAME_CHARS.contains(&self.username.chars().count()) {
            return Err(BridgeError::ValidationFailed(
                "username must be between 3 and 50 characters".to_string(),
            ));
        }
        if self.password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(BridgeError::ValidationFailed(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_CHARS
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: String,
    pub allowed_districts: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user: LoginUser,
}

/// Check credentials and issue a field-system token
pub async fn login(
    directory: &dyn IdentityDirectory,
    authority: &TokenAuthority,
    request: LoginRequest,
) -> Result<LoginResponse> {
    request.validate()?;

    let Some(user) = directory.field_user_by_username(&request.username).await? else {
        warn!(username = %request.username, "Login for unknown user");
        return Err(BridgeError::Unauthorized("Invalid credentials".to_string()));
    };

    if !user.is_active {
        warn!(user_id = user.id, "Login for disabled account");
        return Err(BridgeError::Forbidden("Account disabled".to_string()));
    }

    if !verify_password(&request.password, &user.password_hash) {
        warn!(user_id = user.id, "Login with wrong password");
        return Err(BridgeError::Unauthorized("Invalid credentials".to_string()));
    }

    let token = authority.create_token(
        TokenInput::new(&user.username)
            .with_claim("user_id", user.id)
            .with_claim("role", user.role.clone()),
    )?;

    directory.touch_token_refresh(user.id, DateTime::now()).await?;

    info!(user_id = user.id, role = %user.role, "Field user logged in");

    Ok(LoginResponse {
        access_token: token,
        token_type: "bearer",
        expires_in: authority.ttl().as_secs(),
        user: LoginUser {
            id: user.id,
            allowed_districts: parse_allowed_districts(user.allowed_districts.as_deref()),
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
        },
    })
}

/// POST /auth/login
pub async fn handle_login(req: Request<Incoming>, state: Arc<AppState>) -> Response<BoxBody> {
    let result = async {
        let body = read_body(req).await?;
        let request: LoginRequest = parse_json(&body)?;
        login(
            state.directory.as_ref(),
            state.resolver.authority(TrustDomain::FieldSystem),
            request,
        )
        .await
    }
    .await;

    respond(StatusCode::OK, result)
}
