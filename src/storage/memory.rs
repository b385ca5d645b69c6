//! In-memory storage backend

use crate::storage::{
    Post, PostStore, RefreshTokenRecord, RefreshTokenStore, RevokeOutcome, StorageError, User,
    UserStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Process-local store. Each table is guarded by its own lock, so a revoke
/// check-and-set on a token is atomic.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<Uuid, User>>,
    posts: RwLock<HashMap<Uuid, Post>>,
    refresh_tokens: RwLock<HashMap<String, RefreshTokenRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored refresh tokens (revoked ones included)
    pub fn refresh_token_count(&self) -> usize {
        self.refresh_tokens.read().len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, email: &str, hashed_password: &str) -> Result<User, StorageError> {
        let mut users = self.users.write();

        if users.values().any(|u| u.email == email) {
            return Err(StorageError::Conflict(format!("email already exists: {}", email)));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
            is_premium: false,
        };
        users.insert(user.id, user.clone());

        debug!(user_id = %user.id, "Created user");
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StorageError> {
        self.users
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("User not found: {}", id)))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StorageError> {
        self.users
            .read()
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or_else(|| StorageError::NotFound("User not found".to_string()))
    }

    async fn update_user(
        &self,
        id: Uuid,
        email: &str,
        hashed_password: &str,
    ) -> Result<User, StorageError> {
        let mut users = self.users.write();

        if users.values().any(|u| u.email == email && u.id != id) {
            return Err(StorageError::Conflict(format!("email already exists: {}", email)));
        }

        let user = users
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("User not found: {}", id)))?;
        user.email = email.to_string();
        user.hashed_password = hashed_password.to_string();
        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn upgrade_user(&self, id: Uuid) -> Result<(), StorageError> {
        let mut users = self.users.write();
        let user = users
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("User not found: {}", id)))?;
        user.is_premium = true;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_all_users(&self) -> Result<u64, StorageError> {
        let mut users = self.users.write();
        let count = users.len() as u64;
        users.clear();

        // Mirror ON DELETE CASCADE
        self.posts.write().clear();
        self.refresh_tokens.write().clear();

        Ok(count)
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create_post(&self, user_id: Uuid, body: &str) -> Result<Post, StorageError> {
        if !self.users.read().contains_key(&user_id) {
            return Err(StorageError::NotFound(format!("User not found: {}", user_id)));
        }

        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            body: body.to_string(),
            user_id,
        };
        self.posts.write().insert(post.id, post.clone());
        Ok(post)
    }

    async fn get_post(&self, id: Uuid) -> Result<Post, StorageError> {
        self.posts
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("Post not found: {}", id)))
    }

    async fn list_posts(&self, author: Option<Uuid>) -> Result<Vec<Post>, StorageError> {
        let mut posts: Vec<Post> = self
            .posts
            .read()
            .values()
            .filter(|p| author.map_or(true, |a| p.user_id == a))
            .cloned()
            .collect();
        posts.sort_by_key(|p| p.created_at);
        Ok(posts)
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), StorageError> {
        self.posts
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(format!("Post not found: {}", id)))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn create_refresh_token(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, StorageError> {
        if !self.users.read().contains_key(&user_id) {
            return Err(StorageError::NotFound(format!("User not found: {}", user_id)));
        }

        let mut tokens = self.refresh_tokens.write();
        if tokens.contains_key(token) {
            return Err(StorageError::Conflict("refresh token already exists".to_string()));
        }

        let now = Utc::now();
        let record = RefreshTokenRecord {
            token: token.to_string(),
            user_id,
            created_at: now,
            updated_at: now,
            expires_at,
            revoked_at: None,
        };
        tokens.insert(record.token.clone(), record.clone());
        Ok(record)
    }

    async fn get_refresh_token(&self, token: &str) -> Result<RefreshTokenRecord, StorageError> {
        self.refresh_tokens
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| StorageError::NotFound("Refresh token not found".to_string()))
    }

    async fn revoke_refresh_token(
        &self,
        token: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<RevokeOutcome, StorageError> {
        let mut tokens = self.refresh_tokens.write();
        let record = tokens
            .get_mut(token)
            .ok_or_else(|| StorageError::NotFound("Refresh token not found".to_string()))?;

        if record.revoked_at.is_some() {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }

        record.revoked_at = Some(revoked_at);
        record.updated_at = revoked_at;
        Ok(RevokeOutcome::Revoked)
    }
}
