use anyhow::{Context, Result};

use crate::integrity::ChecksumAlgorithm;
use crate::utils::{validate_secret_strength, SecureString};

mod logging;
mod notify;
mod security;

pub use logging::LoggingConfig;
pub use notify::NotifyConfig;
pub use security::SecurityConfig;

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_JWT_ISSUER: &str = "murmur-server";

/// Lifetime of a submission token. Also bounds how long a consumed token
/// has to be remembered.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 120;

/// Stored messages are cut to this many characters before escaping.
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 1000;

/// `GET /api/messages` never returns more than this many rows.
pub const DEFAULT_MESSAGES_PAGE_LIMIT: i64 = 100;

const DEFAULT_USED_TOKEN_PRUNE_INTERVAL_SECS: u64 = 60;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_USED_TOKEN_KEY_PREFIX: &str = "used_token:";

/// HS256 secrets shorter than this are refused at startup.
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

// ============================================================================
// Configuration Structures
// ============================================================================

/// Database connection pool configuration
#[derive(Clone, Debug)]
pub struct DbConfig {
    /// PostgreSQL URL. Without it messages are kept in process memory.
    pub url: Option<String>,
    pub max_connections: u32,
}

/// Backend for the consumed-token registry
#[derive(Clone, Debug)]
pub struct UsedTokenConfig {
    /// Redis URL. Without it consumed tokens are tracked in process memory,
    /// which is only correct for a single server instance.
    pub redis_url: Option<String>,
    pub key_prefix: String,
    pub prune_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub rust_log: String,

    pub jwt_secret: SecureString,
    pub jwt_issuer: String,
    pub token_ttl_secs: i64,

    pub checksum_algorithm: ChecksumAlgorithm,
    pub max_message_chars: usize,
    pub messages_page_limit: i64,

    /// Directory of static client assets served as the router fallback
    pub static_dir: Option<String>,

    pub db: DbConfig,
    pub used_tokens: UsedTokenConfig,
    pub notify: NotifyConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if let Err(e) = validate_secret_strength(&jwt_secret, MIN_JWT_SECRET_LENGTH) {
            anyhow::bail!("JWT_SECRET is too weak: {}", e);
        }

        let token_ttl_secs: i64 = std::env::var("TOKEN_TTL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        if token_ttl_secs <= 0 {
            anyhow::bail!("TOKEN_TTL_SECS must be positive, got {}", token_ttl_secs);
        }

        let checksum_algorithm = match std::env::var("CHECKSUM_ALGORITHM") {
            Ok(value) => value.parse()?,
            Err(_) => ChecksumAlgorithm::default(),
        };

        Ok(Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            bind_address: std::env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            jwt_secret: SecureString::new(jwt_secret),
            jwt_issuer: std::env::var("JWT_ISSUER")
                .unwrap_or_else(|_| DEFAULT_JWT_ISSUER.to_string()),
            token_ttl_secs,
            checksum_algorithm,
            max_message_chars: std::env::var("MAX_MESSAGE_CHARS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_MESSAGE_CHARS),
            messages_page_limit: std::env::var("MESSAGES_PAGE_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MESSAGES_PAGE_LIMIT),
            static_dir: std::env::var("STATIC_DIR")
                .ok()
                .filter(|d| !d.trim().is_empty()),
            db: DbConfig {
                url: std::env::var("DATABASE_URL")
                    .ok()
                    .filter(|u| !u.trim().is_empty()),
                max_connections: std::env::var("DB_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
            },
            used_tokens: UsedTokenConfig {
                redis_url: std::env::var("REDIS_URL")
                    .ok()
                    .filter(|u| !u.trim().is_empty()),
                key_prefix: std::env::var("USED_TOKEN_KEY_PREFIX")
                    .unwrap_or_else(|_| DEFAULT_USED_TOKEN_KEY_PREFIX.to_string()),
                prune_interval_secs: std::env::var("USED_TOKEN_PRUNE_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_USED_TOKEN_PRUNE_INTERVAL_SECS),
            },
            notify: NotifyConfig::from_env(),
            security: SecurityConfig::from_env(),
            logging: LoggingConfig::from_env()?,
        })
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_ttl_secs)
    }
}
