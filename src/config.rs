//! Configuration management for the safe server.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `8080`.
//! - `DATA_DIR` - Optional. Directory for the account store. Defaults to `./data`.
//! - `SAFE_STORE` - Optional. `file` or `memory`. Defaults to `file`.
//! - `KEY_DIR` - Optional. Directory holding the server keypair. Defaults to `$DATA_DIR/keys`.
//! - `CORS_ALLOW_ANY` - Optional. Allow any origin. Defaults to `true`.
//! - `RUST_LOG` - Optional. Log filter, read by the binary at startup.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::SafeStoreType;
use crate::util::env_var_bool;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Directory for persisted accounts
    pub data_dir: PathBuf,

    /// Directory for the server keypair
    pub key_dir: PathBuf,

    /// Account store backend
    pub store_type: SafeStoreType,

    /// Send permissive CORS headers
    pub cors_allow_any: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an unparsable `PORT` or an
    /// unknown `SAFE_STORE`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = match std::env::var("PORT") {
            Ok(value) => parse_port(&value)?,
            Err(_) => 8080,
        };

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let key_dir = std::env::var("KEY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("keys"));

        let store_type = match std::env::var("SAFE_STORE") {
            Ok(value) => SafeStoreType::parse(&value).ok_or_else(|| {
                ConfigError::InvalidValue("SAFE_STORE".to_string(), value.clone())
            })?,
            Err(_) => SafeStoreType::default(),
        };

        Ok(Self {
            host,
            port,
            key_dir,
            data_dir,
            store_type,
            cors_allow_any: env_var_bool("CORS_ALLOW_ANY", true),
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            key_dir: data_dir.join("keys"),
            data_dir,
            store_type: SafeStoreType::Memory,
            cors_allow_any: true,
        }
    }
}

fn parse_port(value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))
}
