//! Capability interface over the platform Bluetooth stack
//!
//! Every request method is non-blocking: it only issues the request and returns
//! whether the platform accepted it. Completion is reported later as an event
//! pushed through the sender attached with `attach_events`, which keeps all
//! state transitions on the single task that owns the receiving end.

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::Result;
use crate::types::{
    AdapterState, AdvertisementData, AttResult, CentralId, DeviceId, DiscoveredDevice,
    LocalService, ReadRequest, RemoteCharacteristic, RequestId, ServiceHandle, WriteMode,
    WriteRequest,
};

// ----------------------------------------------------------------------------
// Central Role
// ----------------------------------------------------------------------------

/// Asynchronous notifications from the central-role platform stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CentralEvent {
    /// Power or authorization state changed
    StateChanged(AdapterState),
    /// An advertisement matching the scan filter was received
    DeviceDiscovered { device: DiscoveredDevice },
    /// A connect request completed
    Connected { peripheral: DeviceId },
    /// A connect request failed
    ConnectFailed { peripheral: DeviceId, reason: String },
    /// The link dropped, or a disconnect request completed
    Disconnected {
        peripheral: DeviceId,
        reason: Option<String>,
    },
    /// Service discovery completed
    ServicesDiscovered {
        peripheral: DeviceId,
        result: std::result::Result<Vec<ServiceHandle>, String>,
    },
    /// Characteristic discovery for one service completed
    CharacteristicsDiscovered {
        peripheral: DeviceId,
        service: ServiceHandle,
        result: std::result::Result<Vec<RemoteCharacteristic>, String>,
    },
    /// A notification or read response arrived
    ValueUpdated {
        peripheral: DeviceId,
        characteristic: Uuid,
        value: Vec<u8>,
    },
    /// An acknowledged write completed
    WriteCompleted {
        peripheral: DeviceId,
        characteristic: Uuid,
        result: std::result::Result<(), String>,
    },
    /// A signal strength query completed
    RssiRead {
        peripheral: DeviceId,
        result: std::result::Result<i16, String>,
    },
    /// A fire-and-forget request failed after it was issued
    PlatformError { operation: String, reason: String },
}

pub type CentralEventSender = mpsc::UnboundedSender<CentralEvent>;
pub type CentralEventReceiver = mpsc::UnboundedReceiver<CentralEvent>;

/// Central-role primitives of the platform stack
pub trait CentralAdapter: Send {
    /// Attach the sender all completions and notifications are pushed into
    fn attach_events(&mut self, sender: CentralEventSender) -> Result<()>;

    /// Current power state as known to the platform
    fn state(&self) -> AdapterState;

    /// Begin scanning for advertisements carrying any of `services`
    fn start_scan(&mut self, services: &[Uuid]) -> Result<()>;

    fn stop_scan(&mut self) -> Result<()>;

    /// Devices already connected to this host that expose any of `services`.
    /// Answered synchronously from the platform's connection table.
    fn retrieve_connected(&mut self, services: &[Uuid]) -> Result<Vec<DiscoveredDevice>>;

    fn connect(&mut self, peripheral: &DeviceId) -> Result<()>;

    fn disconnect(&mut self, peripheral: &DeviceId) -> Result<()>;

    /// Discover services restricted to `services`
    fn discover_services(&mut self, peripheral: &DeviceId, services: &[Uuid]) -> Result<()>;

    /// Discover characteristics of `service` restricted to `characteristics`
    fn discover_characteristics(
        &mut self,
        peripheral: &DeviceId,
        service: &ServiceHandle,
        characteristics: &[Uuid],
    ) -> Result<()>;

    /// Enable or disable value notifications
    fn set_notify(
        &mut self,
        peripheral: &DeviceId,
        characteristic: &RemoteCharacteristic,
        enabled: bool,
    ) -> Result<()>;

    fn write(
        &mut self,
        peripheral: &DeviceId,
        characteristic: &RemoteCharacteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<()>;

    /// Query the signal strength of a connected peripheral
    fn read_rssi(&mut self, peripheral: &DeviceId) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Peripheral Role
// ----------------------------------------------------------------------------

/// Asynchronous notifications from the peripheral-role platform stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    StateChanged(AdapterState),
    /// A publish request completed
    ServiceAdded {
        service: Uuid,
        result: std::result::Result<(), String>,
    },
    /// A start-advertising request completed
    AdvertisingStarted { result: std::result::Result<(), String> },
    /// A remote central enabled notifications
    Subscribed {
        central: CentralId,
        characteristic: Uuid,
    },
    /// A remote central disabled notifications
    Unsubscribed {
        central: CentralId,
        characteristic: Uuid,
    },
    /// One batch of write requests; answered request by request
    WriteRequests(Vec<WriteRequest>),
    ReadRequest(ReadRequest),
}

pub type PeripheralEventSender = mpsc::UnboundedSender<PeripheralEvent>;
pub type PeripheralEventReceiver = mpsc::UnboundedReceiver<PeripheralEvent>;

/// Peripheral-role primitives of the platform stack
pub trait PeripheralAdapter: Send {
    fn attach_events(&mut self, sender: PeripheralEventSender) -> Result<()>;

    fn state(&self) -> AdapterState;

    /// Register a local service with the GATT server
    fn publish_service(&mut self, service: &LocalService) -> Result<()>;

    fn start_advertising(&mut self, advertisement: &AdvertisementData) -> Result<()>;

    fn stop_advertising(&mut self) -> Result<()>;

    /// Push a new characteristic value; `None` targets every subscribed central
    fn update_value(
        &mut self,
        characteristic: Uuid,
        value: &[u8],
        subscribers: Option<&[CentralId]>,
    ) -> Result<()>;

    /// Answer a read or write request
    fn respond(&mut self, request: RequestId, result: AttResult, value: Option<&[u8]>) -> Result<()>;
}
