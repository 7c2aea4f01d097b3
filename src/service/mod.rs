//! The shared service facade: the only component that talks to the backing
//! store, plus the loading/error aggregator embedded in it.

mod api;
mod error;
mod mount;
mod record;
mod store;
mod tracker;

pub use api::{ConsistencyMode, Readiness, ServiceApi, ServiceSettings};
pub use error::ServiceError;
pub use mount::{ServiceInstance, ServiceMicrofrontend, SERVICE_MODULE};
pub use record::{Draft, Entity, Record, RecordId};
pub use store::{BackingStore, HttpStore, StoreError, StoreTimeouts};
pub use tracker::{Operation, OperationGuard, OperationState, OperationTracker, Verb};
