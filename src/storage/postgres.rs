//! PostgreSQL storage backend

use crate::storage::{
    Post, PostStore, RefreshTokenRecord, RefreshTokenStore, RevokeOutcome, StorageError, User,
    UserStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Object, Pool, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::config::Host;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, created_at, updated_at, email, hashed_password, is_premium";
const POST_COLUMNS: &str = "id, created_at, updated_at, body, user_id";
const REFRESH_COLUMNS: &str = "token, user_id, created_at, updated_at, expires_at, revoked_at";

/// Postgres configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl PostgresConfig {
    pub fn from_env() -> Option<Self> {
        // Try DATABASE_URL first
        if let Ok(url) = std::env::var("DATABASE_URL") {
            return Self::from_url(&url);
        }

        // Fall back to individual vars
        Some(Self {
            host: std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("PGPORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            user: std::env::var("PGUSER").ok()?,
            password: std::env::var("PGPASSWORD").ok(),
            database: std::env::var("PGDATABASE").ok()?,
        })
    }

    /// Parse a `postgres://` connection URL. User, password and database
    /// are percent-decoded; a missing database defaults to the user name.
    pub fn from_url(url: &str) -> Option<Self> {
        if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
            return None;
        }

        let parsed: tokio_postgres::Config = url.parse().ok()?;

        let user = parsed.get_user()?.to_string();
        let host = match parsed.get_hosts().first() {
            Some(Host::Tcp(host)) => host.clone(),
            #[cfg(unix)]
            Some(Host::Unix(path)) => path.to_string_lossy().into_owned(),
            None => "localhost".to_string(),
        };
        let port = parsed.get_ports().first().copied().unwrap_or(5432);
        let password = match parsed.get_password() {
            Some(bytes) => Some(String::from_utf8(bytes.to_vec()).ok()?),
            None => None,
        };
        let database = parsed.get_dbname().unwrap_or(&user).to_string();

        Some(Self {
            host,
            port,
            user,
            password,
            database,
        })
    }
}

/// PostgreSQL storage for users, posts and refresh tokens
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    /// Connect and make sure the schema exists
    pub async fn new(config: PostgresConfig) -> Result<Self, StorageError> {
        let mut cfg = Config::new();
        cfg.host = Some(config.host);
        cfg.port = Some(config.port);
        cfg.user = Some(config.user);
        cfg.password = config.password;
        cfg.dbname = Some(config.database);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let store = Self { pool };
        store.ensure_schema().await?;

        Ok(store)
    }

    async fn client(&self) -> Result<Object, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Ensure database schema exists
    async fn ensure_schema(&self) -> Result<(), StorageError> {
        let client = self.client().await?;

        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id UUID PRIMARY KEY,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    email TEXT NOT NULL UNIQUE,
                    hashed_password TEXT NOT NULL,
                    is_premium BOOLEAN NOT NULL DEFAULT FALSE
                );

                CREATE TABLE IF NOT EXISTS chirps (
                    id UUID PRIMARY KEY,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    body TEXT NOT NULL,
                    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE INDEX IF NOT EXISTS chirps_user_id_idx ON chirps(user_id);
                CREATE INDEX IF NOT EXISTS chirps_created_idx ON chirps(created_at);

                CREATE TABLE IF NOT EXISTS refresh_tokens (
                    token TEXT PRIMARY KEY,
                    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    expires_at TIMESTAMPTZ NOT NULL,
                    revoked_at TIMESTAMPTZ
                );
                "#,
            )
            .await
            .map_err(|e| StorageError::Database(e.to_string()))?;

        info!("Database schema initialized");
        Ok(())
    }
}

/// Map a driver error into the storage taxonomy by SQLSTATE, never by message text
fn map_db_error(e: tokio_postgres::Error) -> StorageError {
    match e.code() {
        Some(code) if *code == SqlState::UNIQUE_VIOLATION => StorageError::Conflict(e.to_string()),
        Some(code) if *code == SqlState::FOREIGN_KEY_VIOLATION => {
            StorageError::NotFound(e.to_string())
        }
        _ => StorageError::Database(e.to_string()),
    }
}

fn user_from_row(row: &Row) -> User {
    User {
        id: row.get(0),
        created_at: row.get(1),
        updated_at: row.get(2),
        email: row.get(3),
        hashed_password: row.get(4),
        is_premium: row.get(5),
    }
}

fn post_from_row(row: &Row) -> Post {
    Post {
        id: row.get(0),
        created_at: row.get(1),
        updated_at: row.get(2),
        body: row.get(3),
        user_id: row.get(4),
    }
}

fn refresh_from_row(row: &Row) -> RefreshTokenRecord {
    RefreshTokenRecord {
        token: row.get(0),
        user_id: row.get(1),
        created_at: row.get(2),
        updated_at: row.get(3),
        expires_at: row.get(4),
        revoked_at: row.get(5),
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn create_user(&self, email: &str, hashed_password: &str) -> Result<User, StorageError> {
        let client = self.client().await?;

        let row = client
            .query_one(
                &format!(
                    "INSERT INTO users (id, email, hashed_password) VALUES ($1, $2, $3) RETURNING {}",
                    USER_COLUMNS
                ),
                &[&Uuid::new_v4(), &email, &hashed_password],
            )
            .await
            .map_err(map_db_error)?;

        let user = user_from_row(&row);
        debug!(user_id = %user.id, "Created user");
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StorageError> {
        let client = self.client().await?;

        let row = client
            .query_opt(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS), &[&id])
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| StorageError::NotFound(format!("User not found: {}", id)))?;

        Ok(user_from_row(&row))
    }

    async fn get_user_by_email(&self, email: &str) -> Result<User, StorageError> {
        let client = self.client().await?;

        let row = client
            .query_opt(
                &format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS),
                &[&email],
            )
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| StorageError::NotFound("User not found".to_string()))?;

        Ok(user_from_row(&row))
    }

    async fn update_user(
        &self,
        id: Uuid,
        email: &str,
        hashed_password: &str,
    ) -> Result<User, StorageError> {
        let client = self.client().await?;

        let row = client
            .query_opt(
                &format!(
                    "UPDATE users SET email = $2, hashed_password = $3, updated_at = NOW()
                     WHERE id = $1 RETURNING {}",
                    USER_COLUMNS
                ),
                &[&id, &email, &hashed_password],
            )
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| StorageError::NotFound(format!("User not found: {}", id)))?;

        Ok(user_from_row(&row))
    }

    async fn upgrade_user(&self, id: Uuid) -> Result<(), StorageError> {
        let client = self.client().await?;

        let result = client
            .execute(
                "UPDATE users SET is_premium = TRUE, updated_at = NOW() WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(map_db_error)?;

        if result == 0 {
            return Err(StorageError::NotFound(format!("User not found: {}", id)));
        }

        debug!(user_id = %id, "Upgraded user");
        Ok(())
    }

    async fn delete_all_users(&self) -> Result<u64, StorageError> {
        let client = self.client().await?;

        client
            .execute("DELETE FROM users", &[])
            .await
            .map_err(map_db_error)
    }
}

#[async_trait]
impl PostStore for PostgresStore {
    async fn create_post(&self, user_id: Uuid, body: &str) -> Result<Post, StorageError> {
        let client = self.client().await?;

        let row = client
            .query_one(
                &format!(
                    "INSERT INTO chirps (id, body, user_id) VALUES ($1, $2, $3) RETURNING {}",
                    POST_COLUMNS
                ),
                &[&Uuid::new_v4(), &body, &user_id],
            )
            .await
            .map_err(map_db_error)?;

        Ok(post_from_row(&row))
    }

    async fn get_post(&self, id: Uuid) -> Result<Post, StorageError> {
        let client = self.client().await?;

        let row = client
            .query_opt(&format!("SELECT {} FROM chirps WHERE id = $1", POST_COLUMNS), &[&id])
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| StorageError::NotFound(format!("Post not found: {}", id)))?;

        Ok(post_from_row(&row))
    }

    async fn list_posts(&self, author: Option<Uuid>) -> Result<Vec<Post>, StorageError> {
        let client = self.client().await?;

        let rows = if let Some(author) = author {
            client
                .query(
                    &format!(
                        "SELECT {} FROM chirps WHERE user_id = $1 ORDER BY created_at ASC",
                        POST_COLUMNS
                    ),
                    &[&author],
                )
                .await
        } else {
            client
                .query(
                    &format!("SELECT {} FROM chirps ORDER BY created_at ASC", POST_COLUMNS),
                    &[],
                )
                .await
        }
        .map_err(map_db_error)?;

        Ok(rows.iter().map(post_from_row).collect())
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), StorageError> {
        let client = self.client().await?;

        let result = client
            .execute("DELETE FROM chirps WHERE id = $1", &[&id])
            .await
            .map_err(map_db_error)?;

        if result == 0 {
            return Err(StorageError::NotFound(format!("Post not found: {}", id)));
        }

        debug!(post_id = %id, "Deleted post");
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for PostgresStore {
    async fn create_refresh_token(
        &self,
        token: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord, StorageError> {
        let client = self.client().await?;

        let row = client
            .query_one(
                &format!(
                    "INSERT INTO refresh_tokens (token, user_id, expires_at) VALUES ($1, $2, $3)
                     RETURNING {}",
                    REFRESH_COLUMNS
                ),
                &[&token, &user_id, &expires_at],
            )
            .await
            .map_err(map_db_error)?;

        debug!(user_id = %user_id, "Created refresh token");
        Ok(refresh_from_row(&row))
    }

    async fn get_refresh_token(&self, token: &str) -> Result<RefreshTokenRecord, StorageError> {
        let client = self.client().await?;

        let row = client
            .query_opt(
                &format!("SELECT {} FROM refresh_tokens WHERE token = $1", REFRESH_COLUMNS),
                &[&token],
            )
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| StorageError::NotFound("Refresh token not found".to_string()))?;

        Ok(refresh_from_row(&row))
    }

    async fn revoke_refresh_token(
        &self,
        token: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<RevokeOutcome, StorageError> {
        let client = self.client().await?;

        // The row lock makes a racing UPDATE re-check `revoked_at IS NULL`,
        // so only one caller observes the transition.
        let updated = client
            .execute(
                "UPDATE refresh_tokens SET revoked_at = $2, updated_at = $2
                 WHERE token = $1 AND revoked_at IS NULL",
                &[&token, &revoked_at],
            )
            .await
            .map_err(map_db_error)?;

        if updated == 1 {
            return Ok(RevokeOutcome::Revoked);
        }

        let exists: bool = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM refresh_tokens WHERE token = $1)",
                &[&token],
            )
            .await
            .map_err(map_db_error)?
            .get(0);

        if exists {
            Ok(RevokeOutcome::AlreadyRevoked)
        } else {
            Err(StorageError::NotFound("Refresh token not found".to_string()))
        }
    }
}
