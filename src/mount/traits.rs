use thiserror::Error;

use super::anchor::Anchor;
use crate::service::ServiceApi;

/// Consumer-supplied mount properties.
pub type Props = serde_json::Value;

/// Errors raised by a module's `mount` entry point.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("Anchor '{anchor}' is detached")]
    AnchorDetached { anchor: String },

    #[error("Anchor '{anchor}' is already occupied by '{occupant}'")]
    AnchorOccupied { anchor: String, occupant: String },

    #[error("Module '{module}' requires the shared service API")]
    MissingService { module: String },

    #[error("Module '{module}' is already mounted")]
    AlreadyMounted { module: String },

    #[error("Mount failed: {0}")]
    Failed(String),
}

/// Arguments passed to [`Mountable::mount`].
#[derive(Clone)]
pub struct MountArgs {
    pub anchor: Anchor,
    pub props: Props,
    pub service: Option<ServiceApi>,
}

impl MountArgs {
    pub fn new(anchor: Anchor) -> Self {
        Self {
            anchor,
            props: Props::Null,
            service: None,
        }
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    pub fn with_service(mut self, service: ServiceApi) -> Self {
        self.service = Some(service);
        self
    }

    /// The injected service, or `MissingService` for `module`.
    pub fn require_service(&self, module: &str) -> Result<ServiceApi, MountError> {
        self.service.clone().ok_or_else(|| MountError::MissingService {
            module: module.to_string(),
        })
    }
}

/// The `mount` entry point exposed by a loaded microfrontend bundle.
pub trait Mountable: Send + Sync {
    /// Attach a new instance to `args.anchor`.
    ///
    /// Must not block; long-running work belongs in spawned tasks owned by
    /// the returned instance.
    fn mount(&self, args: MountArgs) -> Result<Box<dyn MountedInstance>, MountError>;
}

/// Handle for one live microfrontend instance.
pub trait MountedInstance: Send {
    /// Tear the instance down. Called at most once by the controller.
    fn unmount(&mut self);

    /// Whether [`MountedInstance::update_props`] can be used instead of a remount.
    fn supports_props_update(&self) -> bool {
        false
    }

    fn update_props(&mut self, _props: &Props) {}
}
