//! Configuration for the community service
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::auth::JwtValidator;
use crate::types::Result;

/// Connected Community - neighbourhood API server
#[derive(Parser, Debug, Clone)]
#[command(name = "connected-community")]
#[command(about = "Address claiming, street membership and street chat for neighbourhoods")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:4000")]
    pub listen: SocketAddr,

    /// Enable development mode (dev JWT secret, in-memory fallback for MongoDB)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Use the in-memory store instead of MongoDB
    #[arg(long, env = "MEMORY_STORE", default_value = "false")]
    pub memory_store: bool,

    /// MongoDB connection URI (transactions need a replica set)
    #[arg(
        long,
        env = "MONGODB_URI",
        default_value = "mongodb://localhost:27017/?replicaSet=rs0"
    )]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "connectedcommunity")]
    pub mongodb_db: String,

    /// JWT signing secret (required outside dev mode, at least 32 characters)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Session token lifetime in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "604800")]
    pub jwt_expiry_seconds: u64,

    /// Email verification token lifetime in seconds
    #[arg(long, env = "VERIFY_TOKEN_EXPIRY_SECONDS", default_value = "86400")]
    pub verify_token_expiry_seconds: u64,

    /// Browser origin allowed by CORS and used in emailed links
    #[arg(long, env = "CLIENT_ORIGIN", default_value = "http://localhost:5173")]
    pub client_origin: String,

    /// Resend API key; without one, emails are logged instead of sent
    #[arg(long, env = "RESEND_API_KEY")]
    pub resend_api_key: Option<String>,

    /// Sender address for outgoing email
    #[arg(
        long,
        env = "EMAIL_FROM",
        default_value = "Connected Community <noreply@connectedcommunity.local>"
    )]
    pub email_from: String,

    /// Email delivery endpoint
    #[arg(long, env = "EMAIL_API_URL", default_value = "https://api.resend.com/emails")]
    pub email_api_url: String,

    /// Postcode lookup service base URL
    #[arg(long, env = "POSTCODE_API_URL", default_value = "https://api.postcodes.io")]
    pub postcode_api_url: String,

    /// Append membership audit events to this JSONL file
    #[arg(long, env = "AUDIT_LOG_PATH")]
    pub audit_log_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Build the token validator for this configuration
    pub fn jwt_validator(&self) -> Result<JwtValidator> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => JwtValidator::new(
                secret.clone(),
                self.jwt_expiry_seconds,
                self.verify_token_expiry_seconds,
            ),
            (None, true) => Ok(JwtValidator::new_dev()),
            (None, false) => Err(crate::types::CommunityError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if let Some(secret) = &self.jwt_secret {
            if secret.len() < 32 {
                return Err("JWT_SECRET must be at least 32 characters".to_string());
            }
        }

        if self.jwt_expiry_seconds == 0 || self.verify_token_expiry_seconds == 0 {
            return Err("Token lifetimes must be greater than zero".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["connected-community"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_dev_mode_allows_missing_secret() {
        let args = parse(&["--dev-mode"]);
        assert!(args.validate().is_ok());
        assert!(args.jwt_validator().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let args = parse(&["--jwt-secret", "too-short"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_secret_accepted() {
        let args = parse(&["--jwt-secret", "0123456789abcdef0123456789abcdef"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.jwt_expiry_seconds, 604_800);
    }
}
