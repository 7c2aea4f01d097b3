//! Module loader: resolves symbolic remote-module names to mountable bundles.
//!
//! The set of known names is closed and fixed when the [`ModuleRegistry`] is
//! built. Each name is backed by a [`ModuleSource`]; the registry memoizes
//! successful loads so concurrent requests for one name share a single fetch.

mod error;
mod registry;
mod remote;

pub use error::LoadError;
pub use registry::{ModuleRegistry, ModuleRegistryBuilder};
pub use remote::{RemoteEntry, RemoteEntrySource, StaticSource, MOUNT_EXPOSE};

use std::sync::Arc;

use async_trait::async_trait;

use crate::mount::Mountable;

/// Where a module's bundle comes from.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// Fetch the bundle and return its `mount` entry point.
    ///
    /// Called again after a failure; never called again after a success.
    async fn fetch(&self, name: &str) -> Result<Arc<dyn Mountable>, LoadError>;
}
