//! Configuration management for the identity ledger

use crate::error::LedgerError;
use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Seconds between background integrity audits; 0 disables them.
    #[serde(default = "default_audit_interval")]
    pub audit_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            bind: default_bind(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            audit_interval_secs: default_audit_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl ApiConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, LedgerError> {
        let ip: IpAddr = self
            .bind
            .parse()
            .map_err(|e| LedgerError::ConfigError(format!("invalid api.bind '{}': {}", self.bind, e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn default_api_port() -> u16 {
    3000
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_db_path() -> String {
    "./data/ledger.db".to_string()
}

fn default_audit_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load `config.toml` from the working directory.
pub fn load_config() -> Result<Config, LedgerError> {
    load_config_from(Path::new(DEFAULT_CONFIG_PATH))
}

/// Load configuration from `path`. A missing file yields the defaults; the
/// `PORT` environment variable overrides `api.port`.
pub fn load_config_from(path: &Path) -> Result<Config, LedgerError> {
    let mut config = match fs::read_to_string(path) {
        Ok(config_str) => parse_config(&config_str)?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(e) => {
            return Err(LedgerError::ConfigError(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
        config.api.port = port;
    }

    Ok(config)
}

/// Parse and validate a TOML document.
pub fn parse_config(config_str: &str) -> Result<Config, LedgerError> {
    let config: Config = toml::from_str(config_str)?;

    if config.database.path.trim().is_empty() {
        return Err(LedgerError::ConfigError(
            "database.path must be set in config.toml".to_string(),
        ));
    }
    config.api.socket_addr()?;

    Ok(config)
}
