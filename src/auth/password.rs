//! Password hashing and verification
//!
//! Stored hashes come from both source systems. Most are bcrypt, so inputs are
//! cut to bcrypt's 72-byte limit before hashing or checking. Hashes bcrypt
//! cannot read are handed to the PHC verifier (argon2) before giving up.

use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use tracing::debug;

use crate::types::BridgeError;

/// bcrypt ignores everything past this many bytes
pub const BCRYPT_MAX_INPUT: usize = 72;

fn truncated(password: &str) -> &[u8] {
    let bytes = password.as_bytes();
    &bytes[..bytes.len().min(BCRYPT_MAX_INPUT)]
}

/// Hash a password with bcrypt and a fresh random salt
pub fn hash_password(password: &str) -> Result<String, BridgeError> {
    bcrypt::hash(truncated(password), bcrypt::DEFAULT_COST)
        .map_err(|e| BridgeError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash
///
/// Never fails: an unreadable hash or any verifier error counts as a mismatch.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match bcrypt::verify(truncated(password), stored_hash) {
        Ok(matches) => matches,
        Err(e) => {
            debug!("bcrypt verification failed ({e}), trying PHC verifier");
            verify_phc(password, stored_hash)
        }
    }
}

fn verify_phc(password: &str, stored_hash: &str) -> bool {
    let parsed = match PasswordHash::new(stored_hash) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Stored hash is not a PHC string: {e}");
            return false;
        }
    };

    Argon2::default()
        .verify_password(truncated(password), &parsed)
        .is_ok()
}
