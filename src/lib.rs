//! Runtime container for independently loaded microfrontends.
//!
//! The container resolves modules by symbolic name ([`loader`]), keeps each
//! one mounted on its anchor according to a declarative desired state
//! ([`lifecycle`]), and lets them share one backing store through the
//! [`service`] facade, whose mutations are broadcast on the [`bus`].

pub mod bus;
pub mod config;
pub mod container;
pub mod devstore;
pub mod fragments;
pub mod lifecycle;
pub mod loader;
pub mod logging;
pub mod mount;
pub mod repl;
pub mod service;

pub use container::{Container, ContainerError};
