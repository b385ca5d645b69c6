//! Chirpy HTTP server
//!
//! Wires the auth guard and a storage backend into an axum router.

mod error;
mod routes;

pub use error::ApiError;
pub use routes::{create_router, AppState, LoginResponse, TokenResponse, USER_UPGRADED_EVENT};

use crate::auth::{AuthConfig, AuthGuard};
use crate::storage::Store;

use anyhow::{Context, Result};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

/// Platform name that enables development-only endpoints
pub const DEV_PLATFORM: &str = "dev";

/// Chirpy server configuration
#[derive(Debug, Clone)]
pub struct ChirpyServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Token secrets, key and lifetimes
    pub auth: AuthConfig,
    /// Deployment platform (`dev` enables `/admin/reset`)
    pub platform: String,
}

/// The main Chirpy server
pub struct ChirpyServer {
    config: ChirpyServerConfig,
    state: AppState,
}

impl ChirpyServer {
    pub fn new(config: ChirpyServerConfig, store: Arc<dyn Store>) -> Self {
        let guard = Arc::new(AuthGuard::new(config.auth.clone(), store.clone()));
        let state = AppState {
            guard,
            store,
            dev_mode: config.platform == DEV_PLATFORM,
        };

        Self { config, state }
    }

    /// Build the router (for serving or for in-process tests)
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Run the server until `shutdown` resolves, then drain in-flight requests
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.bind_addr))?;

        info!(addr = %self.config.bind_addr, platform = %self.config.platform, "Chirpy server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApiKey;
    use crate::storage::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_until_returns_on_shutdown() {
        let config = ChirpyServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            auth: AuthConfig::new(b"secret".as_slice(), ApiKey::new("key".to_string())),
            platform: "production".to_string(),
        };
        let server = ChirpyServer::new(config, Arc::new(MemoryStore::new()));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = rx.await;
                })
                .await
        });

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server did not stop after shutdown")
            .unwrap();
        assert!(result.is_ok());
    }
}
