//! `Authorization` header parsing
//!
//! Schemes:
//! - `Bearer <token>` : access tokens and refresh tokens
//! - `ApiKey <key>` : service key presented by webhook callers

use axum::http::{header::AUTHORIZATION, HeaderMap};
use thiserror::Error;

/// Scheme used for session tokens
pub const BEARER_SCHEME: &str = "Bearer";
/// Scheme used for the webhook API key
pub const API_KEY_SCHEME: &str = "ApiKey";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("authorization header not provided")]
    MissingHeader,

    #[error("malformed authorization header")]
    MalformedHeader,

    #[error("credential is empty")]
    EmptyCredential,
}

/// Extract the credential carried by the `Authorization` header for `scheme`.
///
/// The header must read exactly `"<scheme> <credential>"`. Only the first
/// `Authorization` value is considered.
pub fn extract_credential<'a>(headers: &'a HeaderMap, scheme: &str) -> Result<&'a str, HeaderError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(HeaderError::MissingHeader)?
        .to_str()
        .map_err(|_| HeaderError::MalformedHeader)?;

    if value.is_empty() {
        return Err(HeaderError::MissingHeader);
    }

    let credential = value
        .strip_prefix(scheme)
        .and_then(|rest| rest.strip_prefix(' '))
        .ok_or(HeaderError::MalformedHeader)?;

    if credential.is_empty() {
        return Err(HeaderError::EmptyCredential);
    }

    Ok(credential)
}

/// Extract a `Bearer` token
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, HeaderError> {
    extract_credential(headers, BEARER_SCHEME)
}

/// Extract an `ApiKey` credential
pub fn api_key(headers: &HeaderMap) -> Result<&str, HeaderError> {
    extract_credential(headers, API_KEY_SCHEME)
}
