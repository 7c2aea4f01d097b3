use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::service::{ConsistencyMode, StoreTimeouts};

/// Root configuration container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub mount: MountConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
}

/// Backing store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the REST store (e.g., "http://localhost:4000").
    #[serde(default = "default_store_url")]
    pub base_url: String,
    /// Request timeout in seconds (default: 10).
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u32,
    /// Connection timeout in seconds (default: 5).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
}

/// Defaults applied to every lifecycle controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MountConfig {
    #[serde(default = "default_true")]
    pub retry_on_failure: bool,
    /// Retries after the first failed attempt (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Constant delay between attempts in milliseconds (default: 1000).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// How long `Container::service` waits for the facade (default: 10).
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_seconds: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub consistency: ConsistencyMode,
}

/// Per-module overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Symbolic module name (e.g., "mfe_1/mount").
    pub name: String,
    /// Remote-entry manifest URL. Without it the module resolves locally.
    #[serde(default)]
    pub entry_url: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub update_props_on_change: Option<bool>,
}

fn default_store_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_timeout() -> u32 {
    10
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_ready_timeout() -> u32 {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_store_url(),
            timeout_seconds: default_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            retry_on_failure: true,
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            ready_timeout_seconds: default_ready_timeout(),
        }
    }
}

impl StoreConfig {
    pub fn timeouts(&self) -> StoreTimeouts {
        StoreTimeouts {
            request: Duration::from_secs(self.timeout_seconds as u64),
            connect: Duration::from_secs(self.connect_timeout_seconds as u64),
        }
    }
}

impl MountConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_seconds as u64)
    }
}

impl Config {
    pub fn remote(&self, name: &str) -> Option<&RemoteConfig> {
        self.remotes.iter().find(|r| r.name == name)
    }
}
