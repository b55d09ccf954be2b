//! Error handling for the gattlink CLI

use thiserror::Error;

use crate::config::ConfigError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Link error: {0}")]
    Link(#[from] gattlink_core::LinkError),

    #[error("Backend error: {0}")]
    Backend(#[from] gattlink_ble::BackendError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Connection to {peripheral} failed: {reason}")]
    Connection { peripheral: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
