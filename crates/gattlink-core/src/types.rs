//! Shared data model for both BLE roles

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Adapter State
// ----------------------------------------------------------------------------

/// Power/authorization state reported by the platform Bluetooth stack
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    #[default]
    Unknown,
    Resetting,
    Unsupported,
    Unauthorized,
    PoweredOff,
    PoweredOn,
}

impl AdapterState {
    /// Scan, connect and advertise requests are only legal when powered on
    pub fn is_powered_on(self) -> bool {
        self == AdapterState::PoweredOn
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdapterState::Unknown => "unknown",
            AdapterState::Resetting => "resetting",
            AdapterState::Unsupported => "unsupported",
            AdapterState::Unauthorized => "unauthorized",
            AdapterState::PoweredOff => "powered off",
            AdapterState::PoweredOn => "powered on",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Devices
// ----------------------------------------------------------------------------

/// Opaque, stable handle the platform stack assigns to a remote device
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A remote central subscribed to the local characteristic
pub type CentralId = DeviceId;

/// A peripheral seen during the current scan session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub id: DeviceId,
    pub name: Option<String>,
    /// Signal strength in dBm; `None` for devices that were already connected
    /// and therefore never went through the advertising path
    pub signal_strength: Option<i16>,
}

impl DiscoveredDevice {
    pub fn new(id: impl Into<DeviceId>, name: Option<String>, signal_strength: Option<i16>) -> Self {
        Self {
            id: id.into(),
            name,
            signal_strength,
        }
    }

    /// Key used to order the discovered list (unknown strength sorts as 0 dBm)
    pub fn sort_key(&self) -> i16 {
        self.signal_strength.unwrap_or(0)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ----------------------------------------------------------------------------
// GATT Attributes
// ----------------------------------------------------------------------------

/// Capability flags a characteristic advertises
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacteristicProperties {
    pub read: bool,
    pub write: bool,
    pub write_without_response: bool,
    pub notify: bool,
    pub indicate: bool,
}

impl CharacteristicProperties {
    /// `{notify, read, write}`, the set the local characteristic is published with
    pub fn notify_read_write() -> Self {
        Self {
            read: true,
            write: true,
            notify: true,
            ..Self::default()
        }
    }
}

/// Access permissions of a locally published characteristic value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributePermissions {
    pub readable: bool,
    pub writeable: bool,
}

/// Whether a write waits for the peripheral's acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    WithResponse,
    WithoutResponse,
}

impl WriteMode {
    /// Prefer acknowledged writes whenever the characteristic supports them
    pub fn from_properties(properties: &CharacteristicProperties) -> Self {
        if properties.write {
            WriteMode::WithResponse
        } else {
            WriteMode::WithoutResponse
        }
    }
}

/// A service found on a remote peripheral
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceHandle {
    pub uuid: Uuid,
    pub primary: bool,
}

/// A characteristic found on a remote peripheral
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteCharacteristic {
    pub uuid: Uuid,
    pub service_uuid: Uuid,
    pub properties: CharacteristicProperties,
}

/// Characteristic published by the local peripheral role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCharacteristic {
    pub uuid: Uuid,
    pub properties: CharacteristicProperties,
    pub permissions: AttributePermissions,
    /// Static value; `None` means every read is forwarded to the application
    pub value: Option<Vec<u8>>,
}

/// Service published by the local peripheral role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalService {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<LocalCharacteristic>,
}

/// Data carried in the local advertisement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementData {
    pub local_name: Option<String>,
    pub service_uuids: Vec<Uuid>,
}

// ----------------------------------------------------------------------------
// Sessions and Role States
// ----------------------------------------------------------------------------

/// Fully negotiated link to a remote peripheral
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedSession {
    pub peripheral: DeviceId,
    pub service: ServiceHandle,
    pub characteristic: RemoteCharacteristic,
    pub write_mode: WriteMode,
}

/// Central coordinator lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    ServiceDiscovery,
    CharacteristicDiscovery,
    Ready,
}

impl CentralState {
    /// Connected but not yet matched to the configured characteristic
    pub fn is_discovering(self) -> bool {
        matches!(
            self,
            CentralState::ServiceDiscovery | CentralState::CharacteristicDiscovery
        )
    }
}

impl fmt::Display for CentralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CentralState::Idle => "Idle",
            CentralState::Scanning => "Scanning",
            CentralState::Connecting => "Connecting",
            CentralState::ServiceDiscovery => "ServiceDiscovery",
            CentralState::CharacteristicDiscovery => "CharacteristicDiscovery",
            CentralState::Ready => "Ready",
        };
        f.write_str(name)
    }
}

/// Peripheral advertiser lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeripheralState {
    #[default]
    Unpublished,
    Published { advertising: bool },
}

impl PeripheralState {
    pub fn is_published(self) -> bool {
        matches!(self, PeripheralState::Published { .. })
    }
}

impl fmt::Display for PeripheralState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeripheralState::Unpublished => f.write_str("Unpublished"),
            PeripheralState::Published { advertising: true } => f.write_str("Published(Advertising)"),
            PeripheralState::Published { advertising: false } => f.write_str("Published"),
        }
    }
}

// ----------------------------------------------------------------------------
// ATT Requests (peripheral role)
// ----------------------------------------------------------------------------

/// Platform handle used to answer an ATT request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

/// Inbound write from a remote central
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub id: RequestId,
    pub central: CentralId,
    pub characteristic: Uuid,
    pub value: Option<Vec<u8>>,
    pub offset: usize,
}

/// Inbound read from a remote central
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub id: RequestId,
    pub central: CentralId,
    pub characteristic: Uuid,
    pub offset: usize,
}

/// ATT result code sent back for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttResult {
    Success,
    InvalidOffset,
    ReadNotPermitted,
    WriteNotPermitted,
    RequestNotSupported,
    UnlikelyError,
}
