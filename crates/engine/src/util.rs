//! Internal helpers for credentials and input normalization.
//!
//! These utilities are **not** part of the public API.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use base64::Engine as _;
use rand::{RngCore, rngs::OsRng};

use crate::{EngineError, ResultEngine};

const SESSION_TOKEN_BYTES: usize = 32;

/// Hash a password with Argon2id and a fresh salt.
pub(crate) fn hash_password(password: &str) -> ResultEngine<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| EngineError::InvalidCredentials(format!("password hashing failed: {err}")))
}

/// Check `password` against a stored hash. A hash that does not parse is a
/// malformed row, not a wrong password.
pub(crate) fn verify_password(hash: &str, password: &str) -> ResultEngine<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| EngineError::MalformedRow(format!("invalid password hash: {err}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Random URL-safe session token.
pub(crate) fn new_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

pub(crate) fn normalize_username(value: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidCredentials(
            "username must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_lowercase())
}

pub(crate) fn require_password(value: &str) -> ResultEngine<&str> {
    if value.is_empty() {
        return Err(EngineError::InvalidCredentials(
            "password must not be empty".to_string(),
        ));
    }
    Ok(value)
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}
