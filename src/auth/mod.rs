//! Authentication for both trust domains
//!
//! - Password verification (bcrypt, PHC fallback)
//! - Token issuance and verification per domain
//! - Principal resolution from bearer tokens

pub mod jwt;
pub mod password;
pub mod principal;
pub mod resolver;

pub use jwt::{extract_token_from_header, Claims, TokenAuthority, TokenInput, TokenValidationResult};
pub use password::{hash_password, verify_password};
pub use principal::{
    is_elevated_role, parse_allowed_districts, DistrictAccess, DistrictFilter, Principal,
    TrustDomain, ELEVATED_ROLES,
};
pub use resolver::DualAuthorityResolver;
