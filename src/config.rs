//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use crate::client::ClientConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// API credentials
#[derive(Clone, Default, Deserialize)]
pub struct CredentialsConfig {
    /// Mixpanel API secret, used as the basic-auth username
    pub api_secret: Option<String>,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("api_secret", &self.api_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("mixpanel-jql").join("config.toml")),
            Some(PathBuf::from("./jql.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::debug!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var("MIXPANEL_API_SECRET") {
            self.credentials.api_secret = Some(secret);
        }

        // Client overrides
        if let Ok(endpoint) = std::env::var("JQL_ENDPOINT") {
            self.client.endpoint = endpoint;
        }
        if let Ok(version) = std::env::var("JQL_API_VERSION") {
            self.client.api_version = version;
        }
        if let Ok(timeout) = std::env::var("JQL_TIMEOUT_SECS") {
            match timeout.parse() {
                Ok(secs) => self.client.timeout_secs = Some(secs),
                Err(e) => tracing::warn!("Ignoring JQL_TIMEOUT_SECS={:?}: {}", timeout, e),
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("JQL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("JQL_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# mixpanel-jql Configuration
#
# Environment variables override these settings:
# - MIXPANEL_API_SECRET
# - JQL_ENDPOINT
# - JQL_API_VERSION
# - JQL_TIMEOUT_SECS
# - JQL_LOG_LEVEL
# - JQL_LOG_FORMAT

[client]
# JQL endpoint; {version} is replaced by api_version
endpoint = "https://mixpanel.com/api/{version}/jql"

# API version
api_version = "2.0"

# Whole-request timeout in seconds (unset = no timeout)
# timeout_secs = 300

[credentials]
# Mixpanel API secret
# api_secret = ""

[logging]
# Log level: trace, debug, info, warn, error
level = "warn"

# Log format: pretty or json
format = "pretty"
"#
    .to_string()
}
