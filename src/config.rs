//! Indexer configuration
//!
//! Layered lowest to highest: built-in defaults, optional YAML file,
//! environment variables, then whatever the CLI overrides.

use crate::connector::PROPUBLICA_API;
use crate::storage::DEFAULT_STORE_TIMEOUT;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_DATABASE: &str = "GRANT_INDEXER_DB";
pub const ENV_API_BASE: &str = "PROPUBLICA_API_BASE";
pub const ENV_TIMEOUT_SECS: &str = "GRANT_INDEXER_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "GRANT_INDEXER_MAX_RETRIES";
pub const ENV_STORE_TIMEOUT_MS: &str = "GRANT_INDEXER_STORE_TIMEOUT_MS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Runtime settings for an ingestion run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Base URL of the ProPublica Nonprofit Explorer API
    pub api_base: String,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Retries for transient search failures
    pub max_retries: u32,
    /// How long a store write waits on another connection's lock
    pub store_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            api_base: PROPUBLICA_API.to_string(),
            request_timeout_secs: 30,
            max_retries: 2,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT.as_millis() as u64,
            user_agent: format!("grant-indexer/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl IndexerConfig {
    /// Defaults overlaid with an optional YAML file, then the process
    /// environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match file {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.with_env(|name| std::env::var(name).ok())
    }

    /// Read a YAML file; keys it omits keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.is_empty()) {
            self.api_base = base;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            self.request_timeout_secs = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_TIMEOUT_SECS,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_MAX_RETRIES) {
            self.max_retries = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_MAX_RETRIES,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_STORE_TIMEOUT_MS) {
            self.store_timeout_ms = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: ENV_STORE_TIMEOUT_MS,
                value: value.clone(),
            })?;
        }
        Ok(self)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// Default database path (~/.local/share/grant-indexer/registry.db)
pub fn default_database_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("grant-indexer").join("registry.db")
}
