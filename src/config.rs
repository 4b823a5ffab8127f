use std::env;
use std::net::SocketAddr;

use chrono::Duration;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("environment variable '{0}' must be set")]
    Missing(&'static str),
    #[error("invalid value for '{0}': {1}")]
    Invalid(&'static str, String),
}

/// Process configuration, read once at startup and passed by reference into
/// the components that need it.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub room_base_url: String,
    pub mail_api_url: String,
    pub mail_from: String,
    pub session_ttl: Duration,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        dotenvy::dotenv().ok();

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid("BIND_ADDR", e.to_string()))?;

        let session_ttl_secs: i64 = env::var("SESSION_TTL_SECS")
            .unwrap_or_else(|_| "86400".to_string())
            .parse()
            .map_err(|e: std::num::ParseIntError| {
                ConfigError::Invalid("SESSION_TTL_SECS", e.to_string())
            })?;

        Ok(Config {
            bind_addr,
            database_url: required("DATABASE_URL")?,
            room_base_url: required("ROOM_BASE_URL")?,
            mail_api_url: required("MAIL_API_URL")?,
            mail_from: required("MAIL_FROM")?,
            session_ttl: Duration::seconds(session_ttl_secs),
        })
    }
}
