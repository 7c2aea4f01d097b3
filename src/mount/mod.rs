//! Mount contract shared by the container and every microfrontend.
//!
//! An [`Anchor`] stands in for the DOM element a fragment attaches to. A
//! [`Mountable`] is the `mount` entry point a loaded bundle exposes, and a
//! [`MountedInstance`] is the handle it returns.

mod anchor;
mod traits;

pub use anchor::Anchor;
pub use traits::{MountArgs, MountError, MountedInstance, Mountable, Props};
