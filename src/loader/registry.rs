use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::OnceCell;

use super::error::LoadError;
use super::ModuleSource;
use crate::mount::Mountable;

struct RegistryEntry {
    source: Arc<dyn ModuleSource>,
    loaded: OnceCell<Arc<dyn Mountable>>,
}

/// Closed, immutable map from symbolic module name to its source.
pub struct ModuleRegistry {
    entries: HashMap<String, RegistryEntry>,
}

/// Builder for [`ModuleRegistry`]. Names are fixed once `build` is called.
#[derive(Default)]
pub struct ModuleRegistryBuilder {
    entries: HashMap<String, RegistryEntry>,
}

impl ModuleRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        name: impl Into<String>,
        source: Arc<dyn ModuleSource>,
    ) -> Result<Self, LoadError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(LoadError::DuplicateModule { name });
        }
        self.entries.insert(
            name,
            RegistryEntry {
                source,
                loaded: OnceCell::new(),
            },
        );
        Ok(self)
    }

    pub fn build(self) -> ModuleRegistry {
        ModuleRegistry {
            entries: self.entries,
        }
    }
}

impl ModuleRegistry {
    pub fn builder() -> ModuleRegistryBuilder {
        ModuleRegistryBuilder::new()
    }

    /// Resolve `name` to its `mount` entry point.
    ///
    /// Unknown names fail immediately. Concurrent callers share one in-flight
    /// fetch; a successful result is cached, a failure is not.
    pub async fn load(&self, name: &str) -> Result<Arc<dyn Mountable>, LoadError> {
        let entry = self.entries.get(name).ok_or_else(|| {
            tracing::error!(module = %name, "Unknown microfrontend module");
            LoadError::UnknownModule {
                name: name.to_string(),
            }
        })?;

        if let Some(module) = entry.loaded.get() {
            return Ok(module.clone());
        }

        let module = entry
            .loaded
            .get_or_try_init(|| async {
                tracing::debug!(module = %name, "Fetching microfrontend module");
                entry.source.fetch(name).await
            })
            .await?;

        Ok(module.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `name` has already been fetched successfully.
    pub fn is_loaded(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entry| entry.loaded.initialized())
    }
}
