//! Application configuration.

use serde::Deserialize;
use std::path::Path;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Bearer token verification.
    pub auth: AuthConfig,
    /// Messaging behaviour.
    #[serde(default)]
    pub messaging: MessagingConfig,
    /// Redis configuration. Enables cross-instance room fanout when set.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Bearer token verification settings.
///
/// Tokens are issued by the main application; the relay only verifies them.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret shared with the token issuer.
    pub jwt_secret: String,
    /// Expected `iss` claim, if the issuer sets one.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Clock skew tolerated when checking `exp`.
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
}

/// Messaging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    /// Page size used when `load_messages` omits `limit`.
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,
    /// Upper bound accepted for `limit`.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,
    /// Maximum message length in characters.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: u64,
    /// IANA timezone used to render clock and relative times.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            max_content_length: default_max_content_length(),
            timezone: default_timezone(),
        }
    }
}

impl MessagingConfig {
    /// Parsed display timezone, UTC when the configured name is unknown.
    #[must_use]
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(timezone = %self.timezone, "Unknown timezone, falling back to UTC");
            chrono_tz::UTC
        })
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL.
    pub url: String,
    /// Key prefix for all Redis channels.
    #[serde(default = "default_redis_prefix")]
    pub prefix: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    3000
}

const fn default_max_connections() -> u32 {
    100
}

const fn default_min_connections() -> u32 {
    5
}

const fn default_leeway_secs() -> u64 {
    30
}

const fn default_page_size() -> u64 {
    50
}

const fn default_max_page_size() -> u64 {
    100
}

const fn default_max_content_length() -> u64 {
    5000
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_redis_prefix() -> String {
    "coachline".to_string()
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present, merged into the process environment)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `COACHLINE_ENV`)
    /// 4. Environment variables with `COACHLINE__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        let env = std::env::var("COACHLINE_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("COACHLINE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("COACHLINE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
