//! Storage backends for Chirpy
//!
//! - Postgres: durable storage for users, posts and refresh tokens
//! - Memory: process-local maps for tests and local development

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{PostgresConfig, PostgresStore};

pub use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub is_premium: bool,
}

/// A post ("chirp") owned by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub body: String,
    pub user_id: Uuid,
}

/// A stored refresh token. Never deleted; revocation sets `revoked_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Usable iff not revoked and `now <= expires_at`
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired_at(now)
    }
}

/// Result of a revoke call on an existing token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    /// This call moved the token into the revoked state
    Revoked,
    /// The token had already been revoked; nothing changed
    AlreadyRevoked,
}

/// Refresh token persistence
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a new, unrevoked refresh token
    async fn create_refresh_token(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, StorageError>;

    /// Point lookup by token value
    async fn get_refresh_token(&self, token: &str) -> Result<RefreshTokenRecord, StorageError>;

    /// Set `revoked_at` (and `updated_at`) unless already set.
    ///
    /// Concurrent calls on the same token must leave exactly one `Revoked`
    /// outcome; the rest report `AlreadyRevoked`.
    async fn revoke_refresh_token(
        &self,
        token: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<RevokeOutcome, StorageError>;
}

/// User persistence
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a user, `Conflict` if the email is taken
    async fn create_user(&self, email: &str, hashed_password: &str) -> Result<User, StorageError>;

    async fn get_user(&self, id: Uuid) -> Result<User, StorageError>;

    async fn get_user_by_email(&self, email: &str) -> Result<User, StorageError>;

    /// Replace a user's email and password hash, `Conflict` if the email is taken
    async fn update_user(
        &self,
        id: Uuid,
        email: &str,
        hashed_password: &str,
    ) -> Result<User, StorageError>;

    /// Mark a user as premium
    async fn upgrade_user(&self, id: Uuid) -> Result<(), StorageError>;

    /// Delete every user (cascades to posts and refresh tokens)
    async fn delete_all_users(&self) -> Result<u64, StorageError>;
}

/// Post persistence
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(&self, user_id: Uuid, body: &str) -> Result<Post, StorageError>;

    async fn get_post(&self, id: Uuid) -> Result<Post, StorageError>;

    /// Posts ordered by `created_at` ascending, optionally filtered by author
    async fn list_posts(&self, author: Option<Uuid>) -> Result<Vec<Post>, StorageError>;

    async fn delete_post(&self, id: Uuid) -> Result<(), StorageError>;
}

/// Everything the HTTP service needs from a backend
pub trait Store: UserStore + PostStore + RefreshTokenStore {}

impl<T: UserStore + PostStore + RefreshTokenStore> Store for T {}
