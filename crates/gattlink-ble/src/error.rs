//! Error types for platform backends

use gattlink_core::LinkError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Failures while bringing up a platform backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to create BLE manager: {0}")]
    ManagerUnavailable(String),

    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("Backend {backend} not compiled in; rebuild with the `{feature}` feature")]
    NotCompiled {
        backend: &'static str,
        feature: &'static str,
    },
}

impl From<BackendError> for LinkError {
    fn from(err: BackendError) -> Self {
        LinkError::platform("backend initialization", err)
    }
}
