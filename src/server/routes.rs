//! HTTP handlers

use crate::auth::{authorize_owner, hash_password, header, AuthError, AuthGuard, ErrorKind};
use crate::posts::prepare_body;
use crate::server::error::ApiError;
use crate::storage::{Post, PostStore, RevokeOutcome, StorageError, Store, User, UserStore};

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Webhook event that marks a user as premium
pub const USER_UPGRADED_EVENT: &str = "user.upgraded";

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub guard: Arc<AuthGuard>,
    pub store: Arc<dyn Store>,
    /// Enables `POST /admin/reset`
    pub dev_mode: bool,
}

/// Create the HTTP router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/healthz", get(health_handler))
        .route("/api/users", post(create_user).put(update_user))
        .route("/api/login", post(login))
        .route("/api/refresh", post(refresh))
        .route("/api/revoke", post(revoke))
        .route("/api/chirps", get(list_posts).post(create_post))
        .route("/api/chirps/{post_id}", get(get_post).delete(delete_post))
        .route("/api/polka/webhooks", post(webhook))
        .route("/admin/reset", post(reset))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    fn check(&self) -> Result<(), ApiError> {
        if self.email.is_empty() {
            return Err(ApiError::BadRequest("email field cannot be empty".to_string()));
        }
        if self.password.is_empty() {
            return Err(ApiError::BadRequest("password field cannot be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub user: User,
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct NewPost {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub author_id: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub data: WebhookData,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub user_id: String,
}

fn hash_or_internal(password: &str) -> Result<String, ApiError> {
    hash_password(password).map_err(|e| {
        warn!(error = %e, "Password hashing failed");
        ApiError::Internal
    })
}

fn email_conflict(e: StorageError) -> ApiError {
    match e {
        StorageError::Conflict(_) => ApiError::Conflict("email already exists".to_string()),
        other => other.into(),
    }
}

async fn create_user(
    State(state): State<AppState>,
    Json(params): Json<Credentials>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    params.check()?;

    let hashed = hash_or_internal(&params.password)?;
    let user = state
        .store
        .create_user(&params.email, &hashed)
        .await
        .map_err(email_conflict)?;

    info!(user_id = %user.id, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<Credentials>,
) -> Result<Json<User>, ApiError> {
    let user_id = state.guard.authenticate_session(&headers)?;
    params.check()?;

    let hashed = hash_or_internal(&params.password)?;
    let user = state
        .store
        .update_user(user_id, &params.email, &hashed)
        .await
        .map_err(email_conflict)?;

    debug!(user_id = %user.id, "User updated");
    Ok(Json(user))
}

async fn login(
    State(state): State<AppState>,
    Json(params): Json<Credentials>,
) -> Result<Json<LoginResponse>, ApiError> {
    params.check()?;

    let session = state.guard.login(&params.email, &params.password).await?;

    Ok(Json(LoginResponse {
        user: session.user,
        token: session.access_token,
        refresh_token: session.refresh_token.token,
    }))
}

async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, ApiError> {
    let refresh_token = header::bearer_token(&headers).map_err(AuthError::from)?;

    // Unknown, expired and revoked refresh tokens all read as unauthenticated
    let token = state
        .guard
        .exchange(refresh_token)
        .await
        .map_err(|e| match e.kind() {
            ErrorKind::Internal => ApiError::from(e),
            _ => ApiError::Unauthorized,
        })?;

    Ok(Json(TokenResponse { token }))
}

async fn revoke(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let refresh_token = header::bearer_token(&headers).map_err(AuthError::from)?;

    match state.guard.revoke(refresh_token).await? {
        RevokeOutcome::Revoked => Ok(StatusCode::NO_CONTENT.into_response()),
        RevokeOutcome::AlreadyRevoked => {
            Ok((StatusCode::OK, "Refresh token has already been revoked").into_response())
        }
    }
}

async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(params): Json<NewPost>,
) -> Result<(StatusCode, Json<Post>), ApiError> {
    let user_id = state.guard.authenticate_session(&headers)?;
    let body = prepare_body(&params.body)?;

    let post = state.store.create_post(user_id, &body).await.map_err(|e| match e {
        // Token outlived its user
        StorageError::NotFound(_) => ApiError::Unauthorized,
        other => other.into(),
    })?;

    debug!(post_id = %post.id, user_id = %user_id, "Post created");
    Ok((StatusCode::CREATED, Json(post)))
}

async fn list_posts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Post>>, ApiError> {
    let author = match params.author_id.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            Uuid::parse_str(raw)
                .map_err(|_| ApiError::BadRequest("invalid author_id".to_string()))?,
        ),
    };

    let mut posts = state.store.list_posts(author).await?;
    if params.sort.as_deref() == Some("desc") {
        posts.reverse();
    }

    Ok(Json(posts))
}

async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<Post>, ApiError> {
    let id = Uuid::parse_str(&post_id).map_err(|_| ApiError::NotFound)?;
    let post = state.store.get_post(id).await?;
    Ok(Json(post))
}

async fn delete_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let user_id = state.guard.authenticate_session(&headers)?;

    // Resolve, then check ownership, then mutate
    let id = Uuid::parse_str(&post_id).map_err(|_| ApiError::NotFound)?;
    let post = state.store.get_post(id).await?;

    if let Err(e) = authorize_owner(user_id, post.user_id) {
        debug!(post_id = %id, user_id = %user_id, "Delete rejected: not the owner");
        return Err(e.into());
    }

    state.store.delete_post(id).await?;

    debug!(post_id = %id, user_id = %user_id, "Post deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    // Authenticate before looking at the payload
    state.guard.authenticate_service_call(&headers)?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("invalid webhook payload".to_string()))?;

    if event.event.is_empty() {
        return Err(ApiError::BadRequest("event field cannot be empty".to_string()));
    }
    if event.event != USER_UPGRADED_EVENT {
        return Ok(StatusCode::NO_CONTENT);
    }

    let user_id = Uuid::parse_str(&event.data.user_id)
        .map_err(|_| ApiError::BadRequest("data.user_id is not a valid id".to_string()))?;

    state.store.upgrade_user(user_id).await?;

    info!(user_id = %user_id, "User upgraded");
    Ok(StatusCode::NO_CONTENT)
}

async fn reset(State(state): State<AppState>) -> Result<Response, ApiError> {
    if !state.dev_mode {
        return Err(ApiError::Forbidden);
    }

    let removed = state.store.delete_all_users().await?;

    info!(removed = removed, "Reset: all users deleted");
    Ok((StatusCode::OK, "Reset complete").into_response())
}
