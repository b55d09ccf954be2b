//! Link configuration shared by both roles

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{LinkError, Result};
use crate::protocol::{
    serde_uuid, DEFAULT_CHARACTERISTIC_UUID, DEFAULT_GREETING, DEFAULT_LOCAL_NAME,
    DEFAULT_RSSI_THRESHOLD, DEFAULT_SERVICE_UUID,
};

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration fixed at construction of a coordinator or advertiser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Service the central filters on and the peripheral publishes
    #[serde(with = "serde_uuid")]
    pub service_uuid: Uuid,
    /// Characteristic used for notifications and writes
    #[serde(with = "serde_uuid")]
    pub characteristic_uuid: Uuid,
    /// Advertisements must be strictly stronger than this (dBm)
    pub rssi_threshold: i16,
    /// Stall timeout for service/characteristic discovery; 0 waits forever
    pub discovery_timeout_ms: u64,
    /// Local name put in the peripheral advertisement
    pub local_name: String,
    /// Payload pushed to a central when it subscribes
    pub greeting: String,
    /// Command mailbox capacity per role task
    pub mailbox_size: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_uuid: DEFAULT_SERVICE_UUID,
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,
            rssi_threshold: DEFAULT_RSSI_THRESHOLD,
            discovery_timeout_ms: 10_000,
            local_name: DEFAULT_LOCAL_NAME.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            mailbox_size: 64,
        }
    }
}

impl LinkConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service/characteristic identity pair
    pub fn with_identity(mut self, service_uuid: Uuid, characteristic_uuid: Uuid) -> Self {
        self.service_uuid = service_uuid;
        self.characteristic_uuid = characteristic_uuid;
        self
    }

    /// Set the proximity gate
    pub fn with_rssi_threshold(mut self, threshold: i16) -> Self {
        self.rssi_threshold = threshold;
        self
    }

    /// Set or disable the discovery stall timeout
    pub fn with_discovery_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.discovery_timeout_ms = match timeout {
            // Sub-millisecond timeouts round up so they never read as disabled
            Some(t) => u64::try_from(t.as_millis()).unwrap_or(u64::MAX).max(1),
            None => 0,
        };
        self
    }

    /// Set the advertised local name
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = name.into();
        self
    }

    /// Set the subscription greeting
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Set the per-task mailbox capacity
    pub fn with_mailbox_size(mut self, size: usize) -> Self {
        self.mailbox_size = size;
        self
    }

    pub fn discovery_timeout(&self) -> Option<Duration> {
        (self.discovery_timeout_ms > 0).then(|| Duration::from_millis(self.discovery_timeout_ms))
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.service_uuid == self.characteristic_uuid {
            return Err(LinkError::InvalidConfiguration {
                reason: "service and characteristic UUIDs must differ".to_string(),
            });
        }
        if !(-127..=20).contains(&self.rssi_threshold) {
            return Err(LinkError::InvalidConfiguration {
                reason: format!("RSSI threshold {} dBm is out of range", self.rssi_threshold),
            });
        }
        if self.mailbox_size == 0 {
            return Err(LinkError::InvalidConfiguration {
                reason: "mailbox size must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
