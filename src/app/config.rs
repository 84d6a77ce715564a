//! Taskflow configuration
//!
//! Stored in `~/.config/taskflow/config.toml`. Priority, highest first:
//!
//! 1. Command line flags (applied in `main.rs`)
//! 2. Environment variables (`TASKFLOW_BACKEND`, `TASKFLOW_REMOTE_URL`, `TASKFLOW_API_KEY`)
//! 3. Config file
//! 4. Defaults

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app::error::ConfigError;
use crate::app::remote::DEFAULT_TABLE;
use crate::app::storage::DEFAULT_STORAGE_KEY;

const APP_DIR: &str = "taskflow";

/// Which store implementation the UI is wired to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// SQLite key-value slot on disk
    #[default]
    Local,
    /// Remote record service over HTTP
    Remote,
    /// In-process slot, nothing survives exit
    Memory,
}

impl Backend {
    pub fn parse(value: &str) -> Option<Backend> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Backend::Local),
            "remote" => Some(Backend::Remote),
            "memory" => Some(Backend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub backend: Backend,

    /// Artificial delay before every local store operation
    #[serde(default)]
    pub latency_ms: u64,

    /// Defaults to `taskflow.log` in the data directory
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub remote: RemoteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Derivative)]
#[derivative(Default)]
#[serde(default)]
pub struct LocalConfig {
    /// SQLite file; defaults to `tasks.db` in the data directory
    pub path: Option<PathBuf>,

    #[derivative(Default(value = "DEFAULT_STORAGE_KEY.to_string()"))]
    pub storage_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Derivative)]
#[derivative(Default)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: Option<String>,

    #[derivative(Default(value = "DEFAULT_TABLE.to_string()"))]
    pub table: String,

    pub api_key: Option<String>,

    #[derivative(Default(value = "10"))]
    pub timeout_secs: u64,
}

impl Config {
    /// `~/.config/taskflow/` on Unix, `%APPDATA%/taskflow/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Missing file means defaults; a malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn with_env(self) -> Result<Config, ConfigError> {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    // Empty variables are ignored
    pub fn with_env_from<F>(mut self, lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(backend) = var("TASKFLOW_BACKEND") {
            self.backend = Backend::parse(&backend).ok_or_else(|| {
                ConfigError::Invalid(format!("unknown backend '{}' in TASKFLOW_BACKEND", backend))
            })?;
        }
        if let Some(url) = var("TASKFLOW_REMOTE_URL") {
            self.remote.base_url = Some(url);
        }
        if let Some(key) = var("TASKFLOW_API_KEY") {
            self.remote.api_key = Some(key);
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend == Backend::Remote && self.remote.base_url.is_none() {
            return Err(ConfigError::Invalid(
                "remote backend needs remote.base_url or TASKFLOW_REMOTE_URL".into(),
            ));
        }
        if self.local.storage_key.is_empty() {
            return Err(ConfigError::Invalid("local.storage_key is empty".into()));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.local
            .path
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("tasks.db"))
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("taskflow.log"))
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }
}
