//! Authentication and authorization
//!
//! Credential types:
//! - Access token: stateless signed JWT, short-lived, resolves to a user id
//! - Refresh token: stateful opaque value, long-lived, revocable
//! - API key: static key for webhook callers (`Authorization: ApiKey <key>`)
//!
//! Ownership: a user may only mutate resources whose owner is that user.

mod guard;
pub mod header;
mod password;
mod tokens;

pub use guard::{
    authorize_owner, AuthConfig, AuthError, AuthGuard, ErrorKind, Session, DEFAULT_ACCESS_TTL,
    DEFAULT_REFRESH_TTL, MAX_ACCESS_TTL_SECS, MAX_REFRESH_TTL_DAYS,
};
pub use header::HeaderError;
pub use password::{hash_password, verify_password, verify_unknown_account, HashError};
pub use tokens::{AccessClaims, AccessToken, ApiKey, RefreshToken, TokenError, TOKEN_ISSUER};
