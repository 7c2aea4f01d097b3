use thiserror::Error;

use super::store::StoreError;
use super::tracker::Operation;

/// Errors returned by [`ServiceApi`](super::ServiceApi) operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Called before the facade signalled readiness
    #[error("Service is not ready yet")]
    NotReady,

    /// Called after the facade was unmounted
    #[error("Service has been unmounted")]
    Unmounted,

    /// Empty identifier or empty draft; no request was made
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Backing-store call failed; also recorded in the operation's error slot
    #[error("{operation} failed: {source}")]
    OperationFailure {
        operation: Operation,
        #[source]
        source: StoreError,
    },
}

impl ServiceError {
    pub fn operation(&self) -> Option<Operation> {
        match self {
            ServiceError::OperationFailure { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}
