//! Error taxonomy for the central and peripheral lifecycles
//!
//! Platform-stack failures are never swallowed: every error callback is
//! classified into one of these kinds and surfaced through the delegate port.

use thiserror::Error;
use uuid::Uuid;

use crate::types::{AdapterState, DeviceId};

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised by the coordination core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Bluetooth adapter not ready (state: {state})")]
    AdapterNotReady { state: AdapterState },

    #[error("Peripheral {peripheral} has no service matching {uuid}")]
    NoMatchingService { peripheral: DeviceId, uuid: Uuid },

    #[error("Peripheral {peripheral} has no characteristic matching {uuid}")]
    NoMatchingCharacteristic { peripheral: DeviceId, uuid: Uuid },

    #[error("Connection to {peripheral} lost: {reason}")]
    ConnectionLost { peripheral: DeviceId, reason: String },

    #[error("Failed to connect to {peripheral}: {reason}")]
    ConnectionFailed { peripheral: DeviceId, reason: String },

    #[error("Discovery on {peripheral} timed out after {duration_ms}ms")]
    DiscoveryTimeout { peripheral: DeviceId, duration_ms: u64 },

    #[error("Device not discovered in this scan session: {device}")]
    UnknownDevice { device: DeviceId },

    #[error("Connection to {peripheral} already in progress")]
    ConnectionInProgress { peripheral: DeviceId },

    #[error("Already connected to {peripheral}")]
    AlreadyConnected { peripheral: DeviceId },

    #[error("No connected peripheral")]
    NotConnected,

    #[error("Platform Bluetooth error during {operation}: {reason}")]
    Platform { operation: String, reason: String },

    #[error("Invalid UUID: {0}")]
    InvalidUuid(String),

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Channel closed")]
    ChannelClosed,
}

impl LinkError {
    /// Build a [`LinkError::Platform`] from an operation name and any displayable cause
    pub fn platform(operation: impl Into<String>, reason: impl ToString) -> Self {
        LinkError::Platform {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the owning session can recover by returning to idle and rescanning.
    ///
    /// Only a closed channel ends the owning task; every other kind is local
    /// to a single scan or connection session.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            LinkError::ChannelClosed | LinkError::InvalidConfiguration { .. }
        )
    }
}

/// Result type for coordination core operations
pub type Result<T> = std::result::Result<T, LinkError>;
