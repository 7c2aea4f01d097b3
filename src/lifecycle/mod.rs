//! Mount/unmount/retry state machine for one microfrontend per anchor.
//!
//! Consumers describe the desired state ([`MountInputs`]): whether the module
//! should be mounted, where, with which props, dependencies and service. A
//! [`MicrofrontendController`] task drives the module's imperative `mount`
//! and `unmount` calls until the live instance matches.

mod controller;
mod options;
mod state;
mod status;

pub use controller::{ControllerError, MicrofrontendController};
pub use options::{ControllerOptions, MountInputs, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY};
pub use state::{ControllerStatus, Phase};
pub use status::{MfeStatus, StatusBoard, StatusEntry};
