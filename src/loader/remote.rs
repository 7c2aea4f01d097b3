use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::error::LoadError;
use super::ModuleSource;
use crate::mount::Mountable;

/// Expose key a remote entry must list to be mountable.
pub const MOUNT_EXPOSE: &str = "./mount";

/// Remote-entry manifest published next to a microfrontend bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub exposes: Vec<String>,
}

impl RemoteEntry {
    pub fn exposes_mount(&self) -> bool {
        self.exposes.iter().any(|e| e == MOUNT_EXPOSE)
    }
}

/// Compiled-in module; resolves without I/O.
pub struct StaticSource {
    module: Arc<dyn Mountable>,
}

impl StaticSource {
    pub fn new(module: Arc<dyn Mountable>) -> Self {
        Self { module }
    }
}

#[async_trait]
impl ModuleSource for StaticSource {
    async fn fetch(&self, _name: &str) -> Result<Arc<dyn Mountable>, LoadError> {
        Ok(self.module.clone())
    }
}

/// Module whose availability is confirmed by fetching its remote entry.
///
/// The manifest must be reachable, parse, and expose `./mount`; the bundle
/// is then bound to the compiled-in implementation.
pub struct RemoteEntrySource {
    client: Client,
    entry_url: String,
    module: Arc<dyn Mountable>,
}

impl RemoteEntrySource {
    pub fn new(
        entry_url: impl Into<String>,
        module: Arc<dyn Mountable>,
        timeout: Duration,
    ) -> Result<Self, LoadError> {
        let entry_url = entry_url.into();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::failure(&entry_url, e))?;
        Ok(Self {
            client,
            entry_url,
            module,
        })
    }

    pub fn entry_url(&self) -> &str {
        &self.entry_url
    }

    async fn fetch_entry(&self, name: &str) -> Result<RemoteEntry, LoadError> {
        let response = self
            .client
            .get(&self.entry_url)
            .send()
            .await
            .map_err(|e| LoadError::failure(name, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::failure(
                name,
                format!("remote entry {} returned {}", self.entry_url, status),
            ));
        }

        response
            .json::<RemoteEntry>()
            .await
            .map_err(|e| LoadError::failure(name, format!("invalid remote entry: {}", e)))
    }
}

#[async_trait]
impl ModuleSource for RemoteEntrySource {
    async fn fetch(&self, name: &str) -> Result<Arc<dyn Mountable>, LoadError> {
        let entry = self.fetch_entry(name).await?;
        if !entry.exposes_mount() {
            return Err(LoadError::failure(
                name,
                format!("remote entry '{}' does not expose {}", entry.name, MOUNT_EXPOSE),
            ));
        }
        tracing::info!(
            module = %name,
            remote = %entry.name,
            version = ?entry.version,
            url = %self.entry_url,
            "Remote entry resolved"
        );
        Ok(self.module.clone())
    }
}
