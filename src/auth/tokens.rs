//! Token types and validation
//!
//! - Access token: stateless HS256 JWT (`header.payload.signature`), carries
//!   the user id as `sub`. Never stored, never revoked; it simply expires.
//! - Refresh token: 256 random bits, lowercase hex. Opaque, looked up in storage.
//! - API key: static secret presented by webhook callers.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Issuer written into and required from every access token
pub const TOKEN_ISSUER: &str = "chirpy";

/// Refresh tokens carry 32 random bytes (64 hex characters)
pub const REFRESH_TOKEN_BYTES: usize = 32;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid token format")]
    InvalidFormat,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token expired")]
    Expired,

    #[error("token subject is not a valid user id")]
    MalformedSubject,

    #[error("token decode error: {0}")]
    DecodeError(String),
}

/// API key for trusted service callers
#[derive(Clone)]
pub struct ApiKey {
    key: String,
}

impl ApiKey {
    pub fn new(key: String) -> Self {
        Self { key }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        // Constant-time comparison to prevent timing attacks
        if candidate.len() != self.key.len() {
            return false;
        }

        let mut result = 0u8;
        for (a, b) in candidate.bytes().zip(self.key.bytes()) {
            result |= a ^ b;
        }
        result == 0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey([REDACTED])")
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JwtHeader {
    alg: String,
    typ: String,
}

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub sub: String,
    /// Issued-at, unix seconds
    pub iat: i64,
    /// Expires-at, unix seconds
    pub exp: i64,
}

/// Signed, time-bounded access token
pub struct AccessToken;

impl AccessToken {
    /// Issue a token for `subject` that expires `ttl` from now
    pub fn issue(subject: Uuid, secret: &[u8], ttl: Duration) -> String {
        Self::issue_at(subject, secret, ttl, Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(subject: Uuid, secret: &[u8], ttl: Duration, now: DateTime<Utc>) -> String {
        let iat = now.timestamp();
        let claims = AccessClaims {
            iss: TOKEN_ISSUER.to_string(),
            sub: subject.to_string(),
            iat,
            exp: iat.saturating_add(ttl.num_seconds()),
        };
        Self::sign(&claims, secret)
    }

    /// Encode and sign arbitrary claims
    pub fn sign(claims: &AccessClaims, secret: &[u8]) -> String {
        let header = JwtHeader {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap_or_default());
        let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());

        let signing_input = format!("{}.{}", header_b64, claims_b64);
        let signature = URL_SAFE_NO_PAD.encode(mac_for(secret, &signing_input).finalize().into_bytes());

        format!("{}.{}", signing_input, signature)
    }

    /// Verify a token and return the user id it was issued for
    pub fn validate(token: &str, secret: &[u8]) -> Result<Uuid, TokenError> {
        Self::validate_at(token, secret, Utc::now())
    }

    /// Verify a token against the clock reading `now`.
    ///
    /// A token is live while `now` is strictly before `exp`, so a zero ttl
    /// yields a token that is already expired.
    pub fn validate_at(token: &str, secret: &[u8], now: DateTime<Utc>) -> Result<Uuid, TokenError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(TokenError::InvalidFormat);
        }

        let (header_b64, claims_b64, signature_b64) = (parts[0], parts[1], parts[2]);

        let header_json = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| TokenError::InvalidFormat)?;
        let header: JwtHeader =
            serde_json::from_slice(&header_json).map_err(|_| TokenError::InvalidFormat)?;
        if header.alg != "HS256" {
            return Err(TokenError::InvalidFormat);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::InvalidSignature)?;
        let signing_input = &token[..header_b64.len() + 1 + claims_b64.len()];
        mac_for(secret, signing_input)
            .verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims_json = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|e| TokenError::DecodeError(e.to_string()))?;
        let claims: AccessClaims = serde_json::from_slice(&claims_json)
            .map_err(|e| TokenError::DecodeError(e.to_string()))?;

        if claims.iss != TOKEN_ISSUER {
            return Err(TokenError::InvalidFormat);
        }

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Uuid::parse_str(&claims.sub).map_err(|_| TokenError::MalformedSubject)
    }
}

fn mac_for(secret: &[u8], input: &str) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(input.as_bytes());
    mac
}

/// Opaque refresh token value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RefreshToken(String);

impl RefreshToken {
    /// Generate a new random refresh token
    pub fn generate() -> Self {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        rand::rng().fill(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
