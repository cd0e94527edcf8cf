//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/countwise/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/countwise/` (~/.config/countwise/)
//! - Data: `$XDG_DATA_HOME/countwise/` (~/.local/share/countwise/)
//! - State/Logs: `$XDG_STATE_HOME/countwise/` (~/.local/state/countwise/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Analytics configuration
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Analytics configuration
///
/// Supplied once when an [`Analytics`](crate::Analytics) instance is built;
/// nothing here can change on a live instance.
#[derive(Debug, Deserialize, Clone)]
pub struct AnalyticsConfig {
    /// Report endpoint used until a URL is stored via `set_url_once`
    pub default_url: Option<String>,

    /// Force analytics on regardless of the stored flag (internal test builds)
    #[serde(default)]
    pub force_enabled: bool,

    /// Value reported under `_android_version`
    #[serde(default = "default_platform_version")]
    pub platform_version: String,

    /// HTTP request timeout in seconds (client default when unset)
    pub timeout_secs: Option<u64>,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            default_url: None,
            force_enabled: false,
            platform_version: default_platform_version(),
            timeout_secs: None,
        }
    }
}

fn default_platform_version() -> String {
    std::env::consts::OS.to_string()
}

impl AnalyticsConfig {
    /// Config with the given default endpoint and everything else defaulted
    pub fn with_default_url(url: impl Into<String>) -> Self {
        Self {
            default_url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Validate configuration, returning error message if invalid.
    ///
    /// `default_url` is optional here; it is checked when present.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = self.default_url.as_deref() {
            reqwest::Url::parse(url).map_err(|e| {
                Error::Config(format!("analytics.default_url {:?} is invalid: {}", url, e))
            })?;
        }

        if self.timeout_secs == Some(0) {
            return Err(Error::Config(
                "analytics.timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/countwise/config.toml` (~/.config/countwise/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("countwise").join("config.toml")
    }

    /// Returns the data directory path (store and installation file)
    ///
    /// `$XDG_DATA_HOME/countwise/` (~/.local/share/countwise/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("countwise")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/countwise/` (~/.local/state/countwise/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("countwise")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/countwise/countwise.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("countwise.log")
    }
}
