//! Debugger configuration
//!
//! Defines the `config.toml` / `config.json` format holding service settings and
//! the persisted per-session run configurations.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Service endpoint used when no root URL is configured
pub const DEFAULT_ROOT_URL: &str = "https://clouddebugger.googleapis.com";

/// Top level configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebuggerConfig {
    /// Debugger service root (default: https://clouddebugger.googleapis.com)
    #[serde(default = "default_root_url")]
    pub root_url: String,

    /// Client timeout for hanging list calls, in seconds
    #[serde(default = "default_long_timeout_secs")]
    pub long_timeout_secs: u64,

    /// Client timeout for everything else, in seconds
    #[serde(default = "default_short_timeout_secs")]
    pub short_timeout_secs: u64,

    /// Global background poller period, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Delay before a live session's first background query
    #[serde(default = "default_controller_initial_delay_ms")]
    pub controller_initial_delay_ms: u64,

    /// Delay between a live session's background queries
    #[serde(default = "default_controller_period_ms")]
    pub controller_period_ms: u64,

    /// Sent as `clientVersion` on every request
    #[serde(default = "default_client_version")]
    pub client_version: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Use server wait tokens for hanging gets. When off, sessions poll every second.
    #[serde(default = "default_true")]
    pub use_wait_token: bool,

    /// Persisted sessions
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

fn default_root_url() -> String {
    DEFAULT_ROOT_URL.to_string()
}

fn default_long_timeout_secs() -> u64 {
    120
}

fn default_short_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_controller_initial_delay_ms() -> u64 {
    2000
}

fn default_controller_period_ms() -> u64 {
    500
}

fn default_client_version() -> String {
    format!("clouddebug-sync/{}", env!("CARGO_PKG_VERSION"))
}

fn default_user_agent() -> String {
    format!("clouddebug/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            root_url: default_root_url(),
            long_timeout_secs: default_long_timeout_secs(),
            short_timeout_secs: default_short_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            controller_initial_delay_ms: default_controller_initial_delay_ms(),
            controller_period_ms: default_controller_period_ms(),
            client_version: default_client_version(),
            user_agent: default_user_agent(),
            use_wait_token: true,
            sessions: Vec::new(),
        }
    }
}

/// Persisted run configuration for one debuggee session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debuggee_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_number: Option<String>,

    /// Last wait token seen for this debuggee
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_token: Option<String>,

    /// Receive change notifications while no debug session is attached
    #[serde(default)]
    pub listen_in_background: bool,
}

/// Error types for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON config: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse TOML config: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Failed to write TOML config: {0}")]
    TomlWriteError(#[from] toml::ser::Error),
}

impl DebuggerConfig {
    /// Load from `path`. JSON for `.json` files, TOML otherwise.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = if is_json(path) {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content)?
        };
        tracing::debug!("Loaded debugger config from {}", path.display());
        Ok(config)
    }

    /// Load from `path`, or defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            toml::to_string_pretty(self)?
        };
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// `<config dir>/clouddebug/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("clouddebug").join("config.toml"))
}
