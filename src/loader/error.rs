use thiserror::Error;

/// Errors raised while resolving a remote module.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The name is not in the registry. Raised before any I/O.
    #[error("Unknown microfrontend module: {name}")]
    UnknownModule { name: String },

    /// Transport, status or parse failure while fetching the bundle.
    #[error("Failed to load '{name}': {reason}")]
    LoadFailure { name: String, reason: String },

    #[error("Module '{name}' registered twice")]
    DuplicateModule { name: String },
}

impl LoadError {
    pub fn failure(name: &str, reason: impl std::fmt::Display) -> Self {
        LoadError::LoadFailure {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether trying the same load again can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LoadError::LoadFailure { .. })
    }
}
