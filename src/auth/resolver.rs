//! Dual-authority token resolution
//!
//! Field-system and registry-system tokens share one API surface. A bearer
//! token is tried against each domain in a fixed order (field system first);
//! the first domain that both verifies the signature and knows an active user
//! for the subject wins. Every failure collapses into `Unauthorized` so the
//! caller never learns which domain a token was close to.

use std::sync::Arc;
use tracing::debug;

use crate::auth::jwt::{extract_token_from_header, TokenAuthority};
use crate::auth::principal::{Principal, TrustDomain};
use crate::db::IdentityDirectory;
use crate::types::{BridgeError, Result};

/// One trust domain: its signing authority and how subjects map to users
#[derive(Debug, Clone)]
struct DomainStrategy {
    domain: TrustDomain,
    authority: TokenAuthority,
}

pub struct DualAuthorityResolver {
    strategies: Vec<DomainStrategy>,
    directory: Arc<dyn IdentityDirectory>,
}

impl DualAuthorityResolver {
    pub fn new(
        field_authority: TokenAuthority,
        registry_authority: TokenAuthority,
        directory: Arc<dyn IdentityDirectory>,
    ) -> Self {
        Self {
            strategies: vec![
                DomainStrategy {
                    domain: TrustDomain::FieldSystem,
                    authority: field_authority,
                },
                DomainStrategy {
                    domain: TrustDomain::RegistrySystem,
                    authority: registry_authority,
                },
            ],
            directory,
        }
    }

    /// Authority that signs tokens for a domain
    pub fn authority(&self, domain: TrustDomain) -> &TokenAuthority {
        // Both domains are always registered in `new`
        let index = match domain {
            TrustDomain::FieldSystem => 0,
            TrustDomain::RegistrySystem => 1,
        };
        &self.strategies[index].authority
    }

    /// Resolve the `Authorization` header value to a principal
    pub async fn resolve_header(&self, auth_header: Option<&str>) -> Result<Principal> {
        let token = extract_token_from_header(auth_header)
            .ok_or_else(|| BridgeError::Unauthorized("Bearer token required".to_string()))?;
        self.resolve(token).await
    }

    /// Resolve a raw bearer token to a principal
    pub async fn resolve(&self, token: &str) -> Result<Principal> {
        for strategy in &self.strategies {
            let verification = strategy.authority.verify_token(token);
            let Some(subject) = verification.subject() else {
                debug!(
                    domain = %strategy.domain,
                    reason = verification.error.as_deref().unwrap_or("no subject"),
                    "Token rejected"
                );
                continue;
            };

            match self.lookup(strategy.domain, subject).await {
                Ok(Some(principal)) => return Ok(principal),
                Ok(None) => {
                    debug!(domain = %strategy.domain, "No active user for token subject");
                }
                Err(e) => {
                    debug!(domain = %strategy.domain, error = %e, "User lookup failed");
                }
            }
        }

        Err(BridgeError::Unauthorized("Invalid token".to_string()))
    }

    async fn lookup(&self, domain: TrustDomain, subject: &str) -> Result<Option<Principal>> {
        match domain {
            TrustDomain::FieldSystem => {
                let user = self.directory.field_user_by_username(subject).await?;
                Ok(user.filter(|u| u.is_active).map(|u| {
                    Principal::field(
                        u.id,
                        u.display_name(),
                        u.role.clone(),
                        u.allowed_districts.as_deref(),
                    )
                }))
            }
            TrustDomain::RegistrySystem => {
                let user = self.directory.registry_user_by_email(subject).await?;
                Ok(user
                    .filter(|u| u.status)
                    .map(|u| Principal::registry(u.id, u.name, u.role, u.id_district)))
            }
        }
    }
}
