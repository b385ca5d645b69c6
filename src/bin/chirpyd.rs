//! Chirpy daemon - HTTP API server

use anyhow::{Context, Result};
use chirpy::auth::{ApiKey, AuthConfig, MAX_ACCESS_TTL_SECS, MAX_REFRESH_TTL_DAYS};
use chirpy::server::{shutdown_signal, ChirpyServer, ChirpyServerConfig};
use chirpy::storage::{PostgresConfig, PostgresStore};
use chrono::Duration;
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "chirpyd")]
#[command(about = "Chirpy HTTP API daemon")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:8080", env = "CHIRPY_BIND")]
    bind: String,

    /// Access token signing secret
    #[arg(long, env = "CHIRPY_SECRET", hide_env_values = true)]
    secret: String,

    /// API key expected from webhook callers
    #[arg(long, env = "CHIRPY_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Deployment platform (`dev` enables /admin/reset)
    #[arg(long, default_value = "production", env = "CHIRPY_PLATFORM")]
    platform: String,

    /// Access token lifetime in seconds
    #[arg(
        long,
        default_value_t = 3600,
        env = "CHIRPY_ACCESS_TTL_SECS",
        value_parser = clap::value_parser!(i64).range(1..=MAX_ACCESS_TTL_SECS)
    )]
    access_ttl_secs: i64,

    /// Refresh token lifetime in days
    #[arg(
        long,
        default_value_t = 60,
        env = "CHIRPY_REFRESH_TTL_DAYS",
        value_parser = clap::value_parser!(i64).range(1..=MAX_REFRESH_TTL_DAYS)
    )]
    refresh_ttl_days: i64,

    /// Log level
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    run_server(args).await
}

async fn run_server(args: Args) -> Result<()> {
    // Parse database config
    let db_config =
        PostgresConfig::from_url(&args.database_url).context("Invalid DATABASE_URL")?;

    // Create store
    let store = Arc::new(PostgresStore::new(db_config).await?);

    // Parse bind address
    let bind_addr = args.bind.parse().context("Invalid bind address")?;

    // Build config
    let auth = AuthConfig::new(args.secret.into_bytes(), ApiKey::new(args.api_key))
        .with_access_ttl(Duration::seconds(args.access_ttl_secs))
        .with_refresh_ttl(Duration::days(args.refresh_ttl_days));

    let config = ChirpyServerConfig {
        bind_addr,
        auth,
        platform: args.platform,
    };

    // Create and run server
    let server = ChirpyServer::new(config, store);

    info!(addr = %args.bind, "Chirpy daemon starting");

    // Drain in-flight requests on SIGINT/SIGTERM
    server.run_until(shutdown_signal()).await?;

    info!("Chirpy daemon stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let base = [
            "chirpyd",
            "--secret",
            "s",
            "--api-key",
            "k",
            "--database-url",
            "postgres://chirpy@localhost/chirpy",
        ];
        Args::try_parse_from(base.iter().chain(extra))
    }

    #[test]
    fn test_ttl_args_are_bounded() {
        assert!(parse(&[]).is_ok());
        assert!(parse(&["--refresh-ttl-days", "100000000"]).is_err());
        assert!(parse(&["--refresh-ttl-days", "0"]).is_err());
        assert!(parse(&["--access-ttl-secs", "0"]).is_err());
        assert!(parse(&["--access-ttl-secs", "86401"]).is_err());

        let args = parse(&["--access-ttl-secs", "900", "--refresh-ttl-days", "30"]).unwrap();
        assert_eq!(args.access_ttl_secs, 900);
        assert_eq!(args.refresh_ttl_days, 30);
    }
}
