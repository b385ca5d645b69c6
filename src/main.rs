//! Chirpy CLI entry point

mod cli;

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use chirpy::auth::{hash_password, AccessToken, ApiKey, AuthConfig};
use chirpy::server::{shutdown_signal, ChirpyServer, ChirpyServerConfig};
use chirpy::storage::{MemoryStore, PostgresConfig, PostgresStore, RevokeOutcome, Store};
use chirpy::AuthGuard;
use chrono::Duration;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Helper to get database config lazily (only when needed)
    let get_db_config = || -> Result<PostgresConfig> {
        if let Some(url) = &cli.database_url {
            PostgresConfig::from_url(url).context("Invalid DATABASE_URL")
        } else {
            PostgresConfig::from_env().context("DATABASE_URL not set")
        }
    };
    let get_secret = || -> Result<String> {
        cli.secret
            .clone()
            .context("CHIRPY_SECRET or --secret required")
    };

    match cli.command {
        Commands::Serve {
            ref bind,
            ref api_key,
            ref platform,
            access_ttl_secs,
            refresh_ttl_days,
            memory,
        } => {
            let auth = AuthConfig::new(get_secret()?, ApiKey::new(api_key.clone()))
                .with_access_ttl(Duration::seconds(access_ttl_secs))
                .with_refresh_ttl(Duration::days(refresh_ttl_days));

            let store: Arc<dyn Store> = if memory {
                info!("Using in-memory store; state is lost on exit");
                Arc::new(MemoryStore::new())
            } else {
                Arc::new(PostgresStore::new(get_db_config()?).await?)
            };

            serve(bind, auth, platform.clone(), store).await
        }
        Commands::HashPassword { ref password } => {
            let hash = hash_password(password)?;
            println!("{}", hash);
            Ok(())
        }
        Commands::IssueToken { user, ttl_secs } => {
            issue_token(user, &get_secret()?, ttl_secs);
            Ok(())
        }
        Commands::VerifyToken { ref token } => verify_token(token, &get_secret()?),
        Commands::Revoke { ref token } => {
            let store = Arc::new(PostgresStore::new(get_db_config()?).await?);
            revoke(token, store).await
        }
        Commands::Init => init(get_db_config()?).await,
        Commands::Status => status(get_db_config()?).await,
    }
}

async fn serve(bind: &str, auth: AuthConfig, platform: String, store: Arc<dyn Store>) -> Result<()> {
    let bind_addr = bind.parse().context("Invalid bind address")?;

    let config = ChirpyServerConfig {
        bind_addr,
        auth,
        platform,
    };

    let server = ChirpyServer::new(config, store);

    info!("Starting Chirpy server...");
    server.run_until(shutdown_signal()).await
}

fn issue_token(user: Uuid, secret: &str, ttl_secs: i64) {
    let token = AccessToken::issue(user, secret.as_bytes(), Duration::seconds(ttl_secs));

    println!("{}", token);
    println!();
    println!("User: {}", user);
    println!("Expires in: {}s", ttl_secs);
}

fn verify_token(token: &str, secret: &str) -> Result<()> {
    let user = AccessToken::validate(token, secret.as_bytes()).context("Token rejected")?;
    println!("Valid token for user {}", user);
    Ok(())
}

async fn revoke(token: &str, store: Arc<PostgresStore>) -> Result<()> {
    // Revocation does not need the signing secret or api key
    let guard = AuthGuard::new(AuthConfig::new(Vec::new(), ApiKey::new(String::new())), store);

    match guard.revoke(token).await.context("Failed to revoke refresh token")? {
        RevokeOutcome::Revoked => println!("Revoked refresh token"),
        RevokeOutcome::AlreadyRevoked => println!("Refresh token was already revoked"),
    }
    Ok(())
}

async fn init(db_config: PostgresConfig) -> Result<()> {
    let _store = PostgresStore::new(db_config).await?;
    println!("Database schema initialized successfully");
    Ok(())
}

async fn status(db_config: PostgresConfig) -> Result<()> {
    let _store = PostgresStore::new(db_config).await?;

    println!("Chirpy Status");
    println!("=============");
    println!("Database: Connected");

    Ok(())
}
