//! CLI command definitions

use chirpy::auth::{MAX_ACCESS_TTL_SECS, MAX_REFRESH_TTL_DAYS};
use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "chirpy")]
#[command(about = "Chirpy credential and session service", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Access token signing secret
    #[arg(long, env = "CHIRPY_SECRET", global = true, hide_env_values = true)]
    pub secret: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind to
        #[arg(short, long, default_value = "0.0.0.0:8080", env = "CHIRPY_BIND")]
        bind: String,

        /// API key expected from webhook callers
        #[arg(long, env = "CHIRPY_API_KEY", hide_env_values = true)]
        api_key: String,

        /// Deployment platform (`dev` enables /admin/reset)
        #[arg(long, default_value = "production", env = "CHIRPY_PLATFORM")]
        platform: String,

        /// Access token lifetime in seconds. Access tokens cannot be revoked,
        /// so keep this short.
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

        /// Keep all state in memory instead of Postgres
        #[arg(long)]
        memory: bool,
    },

    /// Hash a password (Argon2id PHC string)
    HashPassword {
        /// Plaintext password
        password: String,
    },

    /// Issue an access token for a user
    ///
    /// Examples:
    ///   chirpy issue-token --user 0b6ecf0c-4bd0-4f4e-9f8e-8d2f1c0a7e55
    ///   chirpy issue-token --user 0b6ecf0c-4bd0-4f4e-9f8e-8d2f1c0a7e55 --ttl-secs 300
    IssueToken {
        /// User id the token is issued for
        #[arg(long)]
        user: Uuid,

        /// Token lifetime in seconds
        #[arg(
            long,
            default_value_t = 3600,
            value_parser = clap::value_parser!(i64).range(1..=MAX_ACCESS_TTL_SECS)
        )]
        ttl_secs: i64,
    },

    /// Verify an access token and print its user id
    VerifyToken {
        /// Access token
        token: String,
    },

    /// Revoke a refresh token
    Revoke {
        /// Refresh token
        token: String,
    },

    /// Initialize the database schema
    Init,

    /// Check database connectivity
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve_args(extra: &[&str]) -> Vec<String> {
        ["chirpy", "serve", "--api-key", "k"]
            .iter()
            .chain(extra)
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(serve_args(&[])).unwrap();
        match cli.command {
            Commands::Serve {
                access_ttl_secs,
                refresh_ttl_days,
                ..
            } => {
                assert_eq!(access_ttl_secs, 3600);
                assert_eq!(refresh_ttl_days, 60);
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn test_ttl_bounds() {
        for bad in [
            ["--refresh-ttl-days", "100000000"],
            ["--refresh-ttl-days", "0"],
            ["--refresh-ttl-days", "-1"],
            ["--access-ttl-secs", "0"],
            ["--access-ttl-secs", "-60"],
            ["--access-ttl-secs", "9223372036854775807"],
        ] {
            assert!(Cli::try_parse_from(serve_args(&bad)).is_err(), "{:?} accepted", bad);
        }

        let cli = Cli::try_parse_from(serve_args(&["--refresh-ttl-days", "3650"])).unwrap();
        assert!(matches!(cli.command, Commands::Serve { refresh_ttl_days: 3650, .. }));
    }

    #[test]
    fn test_issue_token_ttl_bounds() {
        let user = "0b6ecf0c-4bd0-4f4e-9f8e-8d2f1c0a7e55";
        assert!(Cli::try_parse_from(["chirpy", "issue-token", "--user", user, "--ttl-secs", "0"]).is_err());
        assert!(Cli::try_parse_from(["chirpy", "issue-token", "--user", user, "--ttl-secs", "300"]).is_ok());
    }
}
