//! Composition root: builds the module registry, mounts the shared service
//! facade once and keeps one lifecycle controller per consumer fragment.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::bus::DataChangeBus;
use crate::config::{Config, ConfigError};
use crate::fragments::{
    ItemsFilter, ItemsPanel, NotificationsPanel, UsersPanel, FILTER_MODULE, ITEMS_MODULE,
    NOTIFICATIONS_MODULE, USERS_MODULE,
};
use crate::lifecycle::{
    ControllerError, ControllerOptions, MicrofrontendController, MountInputs, StatusBoard,
    StatusEntry,
};
use crate::loader::{LoadError, ModuleRegistry, ModuleSource, RemoteEntrySource, StaticSource};
use crate::mount::{Anchor, Mountable, Props};
use crate::service::{
    BackingStore, HttpStore, ServiceApi, ServiceError, ServiceMicrofrontend, ServiceSettings,
    StoreError, SERVICE_MODULE,
};

/// Every module name the container can resolve.
pub const BUILTIN_MODULES: [&str; 5] = [
    SERVICE_MODULE,
    ITEMS_MODULE,
    FILTER_MODULE,
    USERS_MODULE,
    NOTIFICATIONS_MODULE,
];

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error("Unknown module '{0}'")]
    UnknownModule(String),

    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),
}

struct Fragment {
    module: &'static str,
    label: &'static str,
    anchor: Anchor,
    controller: MicrofrontendController,
}

pub struct Container {
    config: Config,
    bus: DataChangeBus,
    facade: Arc<ServiceMicrofrontend>,
    service_anchor: Anchor,
    service_controller: MicrofrontendController,
    fragments: Vec<Fragment>,
    board: StatusBoard,
    forwarder: JoinHandle<()>,
}

impl Container {
    /// Start against the HTTP store named in `config`.
    pub async fn connect(config: Config) -> Result<Self, ContainerError> {
        let store = HttpStore::new(&config.store.base_url, config.store.timeouts())?;
        Self::start(config, Arc::new(store)).await
    }

    pub async fn start(config: Config, store: Arc<dyn BackingStore>) -> Result<Self, ContainerError> {
        config.validate()?;

        let bus = DataChangeBus::new();
        let facade = Arc::new(ServiceMicrofrontend::new(
            store,
            bus.clone(),
            ServiceSettings {
                consistency: config.service.consistency,
            },
        ));

        let modules: [(&'static str, Arc<dyn Mountable>); 5] = [
            (SERVICE_MODULE, facade.clone()),
            (ITEMS_MODULE, Arc::new(ItemsPanel)),
            (FILTER_MODULE, Arc::new(ItemsFilter)),
            (USERS_MODULE, Arc::new(UsersPanel)),
            (NOTIFICATIONS_MODULE, Arc::new(NotificationsPanel)),
        ];
        let mut builder = ModuleRegistry::builder();
        for (name, module) in modules {
            let source: Arc<dyn ModuleSource> =
                match config.remote(name).and_then(|r| r.entry_url.as_deref()) {
                    Some(url) => Arc::new(RemoteEntrySource::new(
                        url,
                        module,
                        config.store.timeouts().request,
                    )?),
                    None => Arc::new(StaticSource::new(module)),
                };
            builder = builder.register(name, source)?;
        }
        let registry = Arc::new(builder.build());

        let mut board = StatusBoard::new();

        let service_anchor = Anchor::new("service_mfe");
        let service_controller = MicrofrontendController::spawn(
            registry.clone(),
            controller_options(&config, SERVICE_MODULE),
            MountInputs::new(service_anchor.clone()),
        );
        board.track("Service", service_controller.clone());

        let layout: [(&'static str, &'static str, Props); 4] = [
            (ITEMS_MODULE, "Items", Props::Null),
            (FILTER_MODULE, "Items filter", json!({ "filter": "" })),
            (USERS_MODULE, "Users", Props::Null),
            (NOTIFICATIONS_MODULE, "Notifications", Props::Null),
        ];
        let mut fragments = Vec::with_capacity(layout.len());
        for (module, label, props) in layout {
            let anchor = Anchor::new(module.split('/').next().unwrap_or(module));
            let controller = MicrofrontendController::spawn(
                registry.clone(),
                controller_options(&config, module),
                MountInputs::new(anchor.clone()).ready(false).props(props),
            );
            board.track(label, controller.clone());
            fragments.push(Fragment {
                module,
                label,
                anchor,
                controller,
            });
        }

        let forwarder = tokio::spawn(forward_service(
            facade.clone(),
            fragments.iter().map(|f| f.controller.clone()).collect(),
        ));

        tracing::info!(
            modules = registry.names().len(),
            consistency = %config.service.consistency,
            "Container started"
        );

        Ok(Self {
            config,
            bus,
            facade,
            service_anchor,
            service_controller,
            fragments,
            board,
            forwarder,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &DataChangeBus {
        &self.bus
    }

    /// The facade API, once mounted and ready.
    pub async fn service(&self) -> Result<ServiceApi, ContainerError> {
        let timeout = self.config.mount.ready_timeout();
        let mut rx = self.facade.subscribe_api();
        let wait = async {
            loop {
                let current = rx.borrow_and_update().clone();
                if let Some(api) = current {
                    api.ready().await?;
                    return Ok::<_, ContainerError>(api);
                }
                if rx.changed().await.is_err() {
                    return Err(ContainerError::Service(ServiceError::Unmounted));
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ContainerError::Timeout(timeout, "the service facade".to_string()))?
    }

    /// Wait until every controller has a live instance.
    pub async fn wait_mounted(&self) -> Result<(), ContainerError> {
        let timeout = self.config.mount.ready_timeout();
        let controllers = std::iter::once(&self.service_controller)
            .chain(self.fragments.iter().map(|f| &f.controller));
        for controller in controllers {
            tokio::time::timeout(timeout, controller.wait_for(|s| s.is_mounted()))
                .await
                .map_err(|_| ContainerError::Timeout(timeout, controller.module().to_string()))??;
        }
        Ok(())
    }

    pub fn controller(&self, module: &str) -> Option<&MicrofrontendController> {
        if module == SERVICE_MODULE {
            return Some(&self.service_controller);
        }
        self.fragments
            .iter()
            .find(|f| f.module == module)
            .map(|f| &f.controller)
    }

    pub fn anchor(&self, module: &str) -> Option<&Anchor> {
        if module == SERVICE_MODULE {
            return Some(&self.service_anchor);
        }
        self.fragments
            .iter()
            .find(|f| f.module == module)
            .map(|f| &f.anchor)
    }

    /// Replace the props of one fragment.
    pub async fn set_props(&self, module: &str, props: Props) -> Result<(), ContainerError> {
        let controller = self
            .controller(module)
            .ok_or_else(|| ContainerError::UnknownModule(module.to_string()))?;
        controller.set_props(props).await?;
        Ok(())
    }

    pub async fn set_filter(&self, query: &str) -> Result<(), ContainerError> {
        self.set_props(FILTER_MODULE, json!({ "filter": query })).await
    }

    pub fn status(&self) -> Vec<StatusEntry> {
        self.board.entries()
    }

    /// Status board followed by every fragment's rendered content.
    pub fn render(&self) -> Vec<String> {
        let mut lines = vec!["Microfrontend status".to_string()];
        lines.extend(self.board.render().into_iter().map(|l| format!("  {}", l)));
        for fragment in &self.fragments {
            lines.push(String::new());
            lines.push(format!("== {} ==", fragment.label));
            let content = fragment.anchor.content();
            if content.is_empty() {
                lines.push("  (not mounted)".to_string());
            } else {
                lines.extend(content);
            }
        }
        lines
    }

    /// Tear every controller down and dispose the bus. Safe to call twice.
    pub async fn shutdown(&self) {
        self.forwarder.abort();
        for fragment in &self.fragments {
            fragment.controller.teardown().await;
        }
        self.service_controller.teardown().await;
        self.bus.dispose();
        tracing::info!("Container shut down");
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        // Controllers stop once their last handle is gone
        self.forwarder.abort();
    }
}

fn controller_options(config: &Config, module: &str) -> ControllerOptions {
    let remote = config.remote(module);
    let mount = &config.mount;
    ControllerOptions::new(module)
        .retry_on_failure(mount.retry_on_failure)
        .max_retries(remote.and_then(|r| r.max_retries).unwrap_or(mount.max_retries))
        .retry_delay(Duration::from_millis(
            remote
                .and_then(|r| r.retry_delay_ms)
                .unwrap_or(mount.retry_delay_ms),
        ))
        .update_props_on_change(
            remote
                .and_then(|r| r.update_props_on_change)
                .unwrap_or(module == FILTER_MODULE),
        )
}

/// Inject the facade API into every fragment once it is ready, and retract
/// it when the facade goes away.
async fn forward_service(
    facade: Arc<ServiceMicrofrontend>,
    controllers: Vec<MicrofrontendController>,
) {
    let mut api_rx = facade.subscribe_api();
    drop(facade);
    loop {
        let current = api_rx.borrow_and_update().clone();
        match current {
            Some(api) => {
                if api.ready().await.is_ok() {
                    tracing::debug!("Injecting service API into fragments");
                    for controller in &controllers {
                        hand_over(controller, Some(api.clone())).await;
                    }
                }
            }
            None => {
                for controller in &controllers {
                    hand_over(controller, None).await;
                }
            }
        }
        if api_rx.changed().await.is_err() {
            break;
        }
    }
}

/// Give `api` to one fragment controller, or take it back on `None`.
async fn hand_over(controller: &MicrofrontendController, api: Option<ServiceApi>) {
    let result = match api {
        // Service before ready, so nothing mounts without it
        Some(api) => match controller.set_service(Some(api)).await {
            Ok(()) => controller.set_ready(true).await,
            Err(e) => Err(e),
        },
        None => match controller.set_ready(false).await {
            Ok(()) => controller.set_service(None).await,
            Err(e) => Err(e),
        },
    };
    if let Err(e) = result {
        tracing::debug!(module = controller.module(), error = %e, "Fragment controller skipped service hand-over");
    }
}
