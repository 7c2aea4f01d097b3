use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::Config;
use crate::container::BUILTIN_MODULES;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl Config {
    /// Returns the path to the configuration file.
    ///
    /// Uses `~/.config/mfe-container/config.toml` on Unix/macOS,
    /// or equivalent on other platforms via `dirs::config_dir()`.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("mfe-container").join("config.toml")
    }

    /// Loads configuration from the default config file.
    ///
    /// A missing file yields `Config::default()`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Config::default());
        }
        Self::load_from(&path)
    }

    /// Loads configuration from an explicit path, which must exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// Checks:
    /// - The store URL is http(s)
    /// - The ready timeout is non-zero
    /// - Remote names are unique and refer to compiled-in modules
    /// - Remote entry URLs are http(s)
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.store.base_url) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Store base_url '{}' must start with http:// or https://",
                    self.store.base_url
                ),
            });
        }

        if self.mount.ready_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError {
                message: "mount.ready_timeout_seconds must be greater than zero".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for remote in &self.remotes {
            if !seen.insert(remote.name.as_str()) {
                return Err(ConfigError::ValidationError {
                    message: format!("Remote '{}' is configured more than once", remote.name),
                });
            }
            if !BUILTIN_MODULES.contains(&remote.name.as_str()) {
                return Err(ConfigError::ValidationError {
                    message: format!(
                        "Remote '{}' is not a known module (expected one of: {})",
                        remote.name,
                        BUILTIN_MODULES.join(", ")
                    ),
                });
            }
            if let Some(url) = &remote.entry_url {
                if !is_http_url(url) {
                    return Err(ConfigError::ValidationError {
                        message: format!(
                            "Remote '{}' entry_url '{}' must be an http(s) URL",
                            remote.name, url
                        ),
                    });
                }
            }
        }

        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
