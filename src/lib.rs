//! Chirpy - credential and session service for a social-post API
//!
//! Users log in with email/password and receive a short-lived signed access
//! token plus a long-lived, revocable refresh token. Access tokens authorize
//! requests without a storage lookup; refresh tokens are stored and can be
//! exchanged for new access tokens until they expire or are revoked.

pub mod auth;
pub mod posts;
pub mod server;
pub mod storage;

pub use auth::{AccessToken, ApiKey, AuthConfig, AuthError, AuthGuard, RefreshToken};
pub use server::{ChirpyServer, ChirpyServerConfig};
pub use storage::{MemoryStore, PostgresStore, Store};
