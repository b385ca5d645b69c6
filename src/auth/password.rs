//! Password hashing (Argon2id, PHC string format)

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;
use std::sync::LazyLock;
use thiserror::Error;

/// Stands in for the stored hash of an account that does not exist
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("chirpy-placeholder-password").unwrap_or_default());

#[derive(Debug, Error)]
#[error("failed to hash password: {0}")]
pub struct HashError(String);

/// Hash a plaintext password with a fresh random salt
pub fn hash_password(password: &str) -> Result<String, HashError> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| HashError(e.to_string()))?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| HashError(e.to_string()))
}

/// Check a plaintext password against a stored hash.
///
/// Returns `false` for a mismatch and for a stored hash that does not parse;
/// callers cannot tell the two apart.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Run a full verification against a placeholder hash and discard the
/// result. An unknown account then costs the same as a wrong password.
pub fn verify_unknown_account(password: &str) {
    let _ = verify_password(password, &DUMMY_HASH);
}
