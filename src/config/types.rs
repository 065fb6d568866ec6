//! Core configuration types and loading.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Module runtime settings.
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
    /// Per-module directive values, keyed by module identifier.
    #[serde(default)]
    pub modules: toml::Table,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Module runtime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Directory shared-object modules are loaded from.
    #[cfg_attr(not(feature = "dynamic"), allow(dead_code))]
    #[serde(default = "default_module_dir")]
    pub module_dir: PathBuf,
    /// Modules loaded at startup, in order.
    #[serde(default)]
    pub autoload: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            module_dir: default_module_dir(),
            autoload: Vec::new(),
        }
    }
}

/// Logging configuration.
///
/// `RUST_LOG` overrides `level` when set.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Default filter directive (e.g. `info`, `slsvc_core=debug`).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: `text` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_module_dir() -> PathBuf {
    PathBuf::from("modules")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}
