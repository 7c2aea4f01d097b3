use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::api::{ServiceApi, ServiceSettings};
use super::store::BackingStore;
use crate::bus::DataChangeBus;
use crate::mount::{Anchor, MountArgs, MountError, MountedInstance, Mountable};

/// Symbolic name the facade is registered under.
pub const SERVICE_MODULE: &str = "service_mfe/mount";

/// The shared service facade packaged as a mountable module.
///
/// Only one facade may be live at a time. Its API resolves asynchronously:
/// `mount` returns before the API is ready, and the API is published on
/// [`ServiceMicrofrontend::subscribe_api`] straight away so callers can
/// await [`ServiceApi::ready`].
pub struct ServiceMicrofrontend {
    store: Arc<dyn BackingStore>,
    bus: DataChangeBus,
    settings: ServiceSettings,
    current: Arc<watch::Sender<Option<ServiceApi>>>,
}

impl ServiceMicrofrontend {
    pub fn new(store: Arc<dyn BackingStore>, bus: DataChangeBus, settings: ServiceSettings) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            store,
            bus,
            settings,
            current: Arc::new(current),
        }
    }

    pub fn subscribe_api(&self) -> watch::Receiver<Option<ServiceApi>> {
        self.current.subscribe()
    }

    /// The live API, if mounted.
    pub fn current(&self) -> Option<ServiceApi> {
        self.current.borrow().clone()
    }
}

impl Mountable for ServiceMicrofrontend {
    fn mount(&self, args: MountArgs) -> Result<Box<dyn MountedInstance>, MountError> {
        if self.current().is_some() {
            return Err(MountError::AlreadyMounted {
                module: SERVICE_MODULE.to_string(),
            });
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MountError::Failed(format!("no async runtime: {}", e)))?;

        let api = ServiceApi::new(self.store.clone(), self.bus.clone(), self.settings.clone());
        let ready_task = runtime.spawn({
            let api = api.clone();
            async move {
                tokio::task::yield_now().await;
                api.mark_ready();
            }
        });

        self.current.send_replace(Some(api.clone()));
        args.anchor.render(vec![format!(
            "Shared service (consistency: {})",
            self.settings.consistency
        )]);
        tracing::info!(anchor = %args.anchor.id(), "Service facade mounted");

        Ok(Box::new(ServiceInstance {
            api,
            anchor: args.anchor,
            current: self.current.clone(),
            ready_task: Some(ready_task),
        }))
    }
}

/// Live facade instance. Unmounting shuts the API down.
pub struct ServiceInstance {
    api: ServiceApi,
    anchor: Anchor,
    current: Arc<watch::Sender<Option<ServiceApi>>>,
    ready_task: Option<JoinHandle<()>>,
}

impl MountedInstance for ServiceInstance {
    fn unmount(&mut self) {
        if let Some(task) = self.ready_task.take() {
            task.abort();
        }
        self.api.unmount();
        let api = &self.api;
        self.current.send_if_modified(|current| {
            if current.as_ref().is_some_and(|c| c.ptr_eq(api)) {
                *current = None;
                true
            } else {
                false
            }
        });
        self.anchor.render(Vec::new());
    }
}
