//! Signed, time-bound identity tokens
//!
//! Each trust domain owns one `TokenAuthority` (its own secret). The two
//! domains share an algorithm and lifetime from configuration.
//!
//! Security notes:
//! - Only HMAC algorithms are accepted (symmetric secrets)
//! - No leeway on expiry: an expired token is invalid immediately
//! - Verification never raises; every failure is a `TokenValidationResult::invalid`

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::types::BridgeError;

/// Default token lifetime (60 minutes)
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Payload stored in a token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: username (field system) or email (registry system)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Any additional caller-supplied claims
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub subject: String,
    pub extra: Map<String, Value>,
}

impl TokenInput {
    /// Build an input; the subject is coerced to a string
    pub fn new(subject: impl ToString) -> Self {
        Self {
            subject: subject.to_string(),
            extra: Map::new(),
        }
    }

    /// Attach an extra claim
    pub fn with_claim(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }

    /// Subject of a valid token
    pub fn subject(&self) -> Option<&str> {
        self.claims
            .as_ref()
            .map(|c| c.sub.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Token issuer and verifier for one trust domain
#[derive(Clone)]
pub struct TokenAuthority {
    secret: String,
    algorithm: Algorithm,
    ttl: Duration,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("algorithm", &self.algorithm)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    /// Create a new authority
    ///
    /// Returns an error if the secret is empty or the algorithm is not HMAC-based
    pub fn new(secret: String, algorithm: Algorithm, ttl: Duration) -> Result<Self, BridgeError> {
        if secret.is_empty() {
            return Err(BridgeError::Config("Token secret must not be empty".into()));
        }

        if !matches!(
            algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(BridgeError::Config(format!(
                "Unsupported token algorithm: {:?}",
                algorithm
            )));
        }

        Ok(Self {
            secret,
            algorithm,
            ttl,
        })
    }

    /// Default token lifetime for this authority
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token with the authority's default lifetime
    pub fn create_token(&self, input: TokenInput) -> Result<String, BridgeError> {
        self.create_token_with_ttl(input, self.ttl)
    }

    /// Sign a token with an explicit lifetime
    pub fn create_token_with_ttl(
        &self,
        input: TokenInput,
        ttl: Duration,
    ) -> Result<String, BridgeError> {
        let now = unix_now()?;

        let mut extra = input.extra;
        // Reserved claims are always computed here
        for reserved in ["sub", "iat", "exp"] {
            extra.remove(reserved);
        }

        let claims = Claims {
            sub: input.subject,
            iat: now,
            exp: now + ttl.as_secs(),
            extra,
        };

        encode(
            &Header::new(self.algorithm),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| BridgeError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify and decode a token
    pub fn verify_token(&self, token: &str) -> TokenValidationResult {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;

        match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(token_data) => {
                if token_data.claims.sub.is_empty() {
                    return TokenValidationResult::invalid("Token has no subject");
                }
                TokenValidationResult::valid(token_data.claims)
            }
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let error_msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken => "Invalid token",
                    ErrorKind::InvalidSignature => "Invalid signature",
                    ErrorKind::InvalidAlgorithm => "Unexpected algorithm",
                    _ => "Token validation failed",
                };
                TokenValidationResult::invalid(error_msg)
            }
        }
    }
}

fn unix_now() -> Result<u64, BridgeError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| BridgeError::Internal(format!("System time error: {}", e)))
}

/// Extract token from Authorization header ("Bearer <token>")
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?.trim();
    let (scheme, token) = header.split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
