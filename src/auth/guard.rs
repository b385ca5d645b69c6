//! Authorization guard: resolves principals and enforces ownership

use crate::auth::header::{self, HeaderError};
use crate::auth::password::{verify_password, verify_unknown_account};
use crate::auth::tokens::{AccessToken, ApiKey, RefreshToken, TokenError};
use crate::storage::{
    RefreshTokenRecord, RefreshTokenStore, RevokeOutcome, StorageError, Store, User, UserStore,
};
use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Access tokens cannot be revoked individually; a compromised one stays
/// valid until it expires. Keep this short and rely on refresh tokens for
/// longer sessions.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::hours(1);

/// Refresh token lifetime
pub const DEFAULT_REFRESH_TTL: Duration = Duration::days(60);

/// Upper bounds accepted from the command line
pub const MAX_ACCESS_TTL_SECS: i64 = 24 * 60 * 60;
pub const MAX_REFRESH_TTL_DAYS: i64 = 10 * 365;

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("invalid credentials")]
    Unauthorized,

    #[error("refresh token expired")]
    Expired,

    #[error("refresh token revoked")]
    Revoked,

    #[error("not the owner of this resource")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Coarse failure classes exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Header(_)
            | AuthError::Token(_)
            | AuthError::Unauthorized
            | AuthError::Expired
            | AuthError::Revoked => ErrorKind::Unauthenticated,
            AuthError::Forbidden => ErrorKind::Forbidden,
            AuthError::NotFound => ErrorKind::NotFound,
            AuthError::Conflict(_) => ErrorKind::Conflict,
            AuthError::Storage(_) | AuthError::Config(_) => ErrorKind::Internal,
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(_) => AuthError::NotFound,
            StorageError::Conflict(msg) => AuthError::Conflict(msg),
            StorageError::Database(msg) => AuthError::Storage(msg),
        }
    }
}

/// Process-wide auth settings, read once at startup
#[derive(Clone)]
pub struct AuthConfig {
    /// Secret for signing access tokens
    pub token_secret: Vec<u8>,
    /// Key expected from webhook callers
    pub api_key: ApiKey,
    /// Access token lifetime (see [`DEFAULT_ACCESS_TTL`])
    pub access_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_ttl: Duration,
}

impl AuthConfig {
    pub fn new(token_secret: impl Into<Vec<u8>>, api_key: ApiKey) -> Self {
        Self {
            token_secret: token_secret.into(),
            api_key,
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
        }
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_secret", &"[REDACTED]")
            .field("api_key", &self.api_key)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub refresh_token: RefreshTokenRecord,
}

/// Plain ownership check. Callers resolve the resource first (so a missing
/// resource is `NotFound`), then call this, and only mutate on `Ok`.
pub fn authorize_owner(principal: Uuid, owner: Uuid) -> Result<(), AuthError> {
    if principal == owner {
        Ok(())
    } else {
        Err(AuthError::Forbidden)
    }
}

pub struct AuthGuard {
    config: AuthConfig,
    store: Arc<dyn Store>,
}

impl AuthGuard {
    pub fn new(config: AuthConfig, store: Arc<dyn Store>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Issue an access token for `user_id` with the configured ttl
    pub fn issue_access_token(&self, user_id: Uuid) -> String {
        AccessToken::issue(user_id, &self.config.token_secret, self.config.access_ttl)
    }

    /// Resolve the principal behind a `Bearer` access token
    pub fn authenticate_session(&self, headers: &HeaderMap) -> Result<Uuid, AuthError> {
        let result = header::bearer_token(headers)
            .map_err(AuthError::from)
            .and_then(|token| {
                AccessToken::validate(token, &self.config.token_secret).map_err(AuthError::from)
            });

        if let Err(ref e) = result {
            debug!(reason = %e, "Session authentication failed");
        }
        result
    }

    /// Check the `ApiKey` credential of a trusted service caller.
    /// Every failure collapses to `Unauthorized`.
    pub fn authenticate_service_call(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        match header::api_key(headers) {
            Ok(key) if self.config.api_key.matches(key) => Ok(()),
            Ok(_) => {
                debug!("Service call rejected: api key mismatch");
                Err(AuthError::Unauthorized)
            }
            Err(e) => {
                debug!(reason = %e, "Service call rejected");
                Err(AuthError::Unauthorized)
            }
        }
    }

    /// Check email and password, then issue an access token and a new refresh token.
    ///
    /// An unknown email and a wrong password are indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let user = match self.store.get_user_by_email(email).await {
            Ok(user) => user,
            Err(StorageError::NotFound(_)) => {
                verify_unknown_account(password);
                debug!("Login rejected: unknown email");
                return Err(AuthError::Unauthorized);
            }
            Err(e) => return Err(e.into()),
        };

        if !verify_password(password, &user.hashed_password) {
            debug!(user_id = %user.id, "Login rejected: password mismatch");
            return Err(AuthError::Unauthorized);
        }

        let access_token = self.issue_access_token(user.id);
        let refresh_token = self.issue_refresh_token(user.id).await?;

        debug!(user_id = %user.id, "User logged in");
        Ok(Session {
            user,
            access_token,
            refresh_token,
        })
    }

    /// Generate and persist a refresh token for `user_id`
    pub async fn issue_refresh_token(&self, user_id: Uuid) -> Result<RefreshTokenRecord, AuthError> {
        let token = RefreshToken::generate();
        let expires_at = Utc::now()
            .checked_add_signed(self.config.refresh_ttl)
            .ok_or_else(|| {
                warn!(ttl = ?self.config.refresh_ttl, "Refresh token lifetime out of range");
                AuthError::Config("refresh token lifetime out of range".to_string())
            })?;

        self.store
            .create_refresh_token(token.as_str(), user_id, expires_at)
            .await
            .map_err(|e| {
                warn!(user_id = %user_id, error = %e, "Failed to store refresh token");
                AuthError::from(e)
            })
    }

    /// Trade a refresh token for a new access token.
    ///
    /// The refresh token is not rotated and stays usable until it expires or
    /// is revoked.
    pub async fn exchange(&self, refresh_token: &str) -> Result<String, AuthError> {
        self.exchange_at(refresh_token, Utc::now()).await
    }

    pub async fn exchange_at(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        let record = self.store.get_refresh_token(refresh_token).await?;

        // Revocation is terminal and stored, so it wins over expiry
        if record.is_revoked() {
            debug!(user_id = %record.user_id, "Refresh rejected: token revoked");
            return Err(AuthError::Revoked);
        }
        if record.is_expired_at(now) {
            debug!(user_id = %record.user_id, "Refresh rejected: token expired");
            return Err(AuthError::Expired);
        }

        Ok(self.issue_access_token(record.user_id))
    }

    /// Revoke a refresh token. Revoking twice reports `AlreadyRevoked`.
    pub async fn revoke(&self, refresh_token: &str) -> Result<RevokeOutcome, AuthError> {
        let outcome = self
            .store
            .revoke_refresh_token(refresh_token, Utc::now())
            .await?;

        debug!(outcome = ?outcome, "Refresh token revoke");
        Ok(outcome)
    }
}
