use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/alumni_portal";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_MAX_DB_CONNECTIONS: u32 = 5;
const DEFAULT_PAYSTACK_BASE_URL: &str = "https://api.paystack.co";
const DEFAULT_PAYSTACK_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CURRENCY: &str = "NGN";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub secret_key: String,
    pub base_url: String,
    pub callback_url: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_db_connections: u32,
    pub paystack: PaystackConfig,
    /// Currency for events created without one.
    pub default_currency: String,
    pub cors_allowed_origins: String,
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source; `from_env` passes
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind_addr = var("BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                name: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let max_db_connections = parse_or(
            "DATABASE_MAX_CONNECTIONS",
            var("DATABASE_MAX_CONNECTIONS"),
            DEFAULT_MAX_DB_CONNECTIONS,
        )?;
        let timeout_secs = parse_or(
            "PAYSTACK_TIMEOUT_SECS",
            var("PAYSTACK_TIMEOUT_SECS"),
            DEFAULT_PAYSTACK_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "PAYSTACK_TIMEOUT_SECS",
                reason: "must be at least 1".to_string(),
            });
        }

        let paystack = PaystackConfig {
            secret_key: var("PAYSTACK_SECRET_KEY")
                .ok_or(ConfigError::Missing("PAYSTACK_SECRET_KEY"))?,
            base_url: var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PAYSTACK_BASE_URL.to_string()),
            callback_url: var("PAYSTACK_CALLBACK_URL"),
            timeout: Duration::from_secs(timeout_secs),
        };

        Ok(Self {
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            bind_addr,
            max_db_connections,
            paystack,
            default_currency: var("PAYMENT_CURRENCY")
                .map(|c| c.trim().to_uppercase())
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            production: var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
        })
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
