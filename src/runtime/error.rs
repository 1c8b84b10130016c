//! Error types for the container runtime boundary.

use thiserror::Error;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors returned by a [`ContainerRuntime`](super::ContainerRuntime).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The engine is not reachable.
    #[error("Container runtime not available: {reason}")]
    Unavailable {
        /// Reason the connection failed.
        reason: String,
    },

    /// A container, network, or image was absent where one was expected.
    #[error("Not found: {message}")]
    NotFound {
        /// Engine-reported message.
        message: String,
    },

    /// The resource already exists or is already in the requested state.
    #[error("Conflict: {message}")]
    Conflict {
        /// Engine-reported message.
        message: String,
    },

    /// The engine rejected the request.
    #[error("Runtime API error: {message}")]
    Api {
        /// Engine-reported message.
        message: String,
    },
}

impl RuntimeError {
    /// True for absent-resource errors, which are non-fatal throughout the
    /// orchestration core.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound { .. })
    }
}
