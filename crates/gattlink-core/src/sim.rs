//! In-memory adapters for tests and the CLI demo backend
//!
//! Each simulated adapter shares its world with a controller handle. The
//! adapter is handed to a coordinator or task; the controller stays with the
//! test to change power state, inject events and inspect the recorded calls.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use uuid::Uuid;

use crate::adapter::{
    CentralAdapter, CentralEvent, CentralEventReceiver, CentralEventSender, PeripheralAdapter,
    PeripheralEvent, PeripheralEventReceiver, PeripheralEventSender,
};
use crate::central::CentralCoordinator;
use crate::delegate::{LinkDelegate, LinkEvent};
use crate::errors::{LinkError, Result};
use crate::peripheral::PeripheralAdvertiser;
use crate::types::{
    AdapterState, AdvertisementData, AttResult, CentralId, CentralState, CharacteristicProperties,
    DeviceId, DiscoveredDevice, LocalService, PeripheralState, ReadRequest, RemoteCharacteristic,
    RequestId, ServiceHandle, WriteMode, WriteRequest,
};

fn lock<T>(shared: &Mutex<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// Call Log
// ----------------------------------------------------------------------------

/// A request a coordinator or advertiser issued to its adapter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterCall {
    StartScan(Vec<Uuid>),
    StopScan,
    RetrieveConnected(Vec<Uuid>),
    Connect(DeviceId),
    Disconnect(DeviceId),
    DiscoverServices(DeviceId),
    DiscoverCharacteristics {
        peripheral: DeviceId,
        service: Uuid,
    },
    SetNotify {
        peripheral: DeviceId,
        characteristic: Uuid,
        enabled: bool,
    },
    Write {
        peripheral: DeviceId,
        data: Vec<u8>,
        mode: WriteMode,
    },
    ReadRssi(DeviceId),
    PublishService(LocalService),
    StartAdvertising(AdvertisementData),
    StopAdvertising,
    UpdateValue {
        characteristic: Uuid,
        value: Vec<u8>,
        subscribers: Option<Vec<CentralId>>,
    },
    Respond {
        request: RequestId,
        result: AttResult,
        value: Option<Vec<u8>>,
    },
}

// ----------------------------------------------------------------------------
// Simulated Remote Devices
// ----------------------------------------------------------------------------

/// A GATT service exposed by a simulated peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedService {
    pub uuid: Uuid,
    pub characteristics: Vec<(Uuid, CharacteristicProperties)>,
}

impl SimulatedService {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, uuid: Uuid, properties: CharacteristicProperties) -> Self {
        self.characteristics.push((uuid, properties));
        self
    }
}

/// A remote peripheral the simulated central can see
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedDevice {
    pub id: DeviceId,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub services: Vec<SimulatedService>,
    /// Already connected to this host, so reported by `retrieve_connected`
    /// instead of advertising
    pub connected_elsewhere: bool,
}

impl SimulatedDevice {
    pub fn new(id: impl Into<DeviceId>, rssi: Option<i16>) -> Self {
        Self {
            id: id.into(),
            name: None,
            rssi,
            services: Vec::new(),
            connected_elsewhere: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_service(mut self, service: SimulatedService) -> Self {
        self.services.push(service);
        self
    }

    pub fn already_connected(mut self) -> Self {
        self.connected_elsewhere = true;
        self
    }

    fn exposes_any(&self, filter: &[Uuid]) -> bool {
        filter.is_empty()
            || self
                .services
                .iter()
                .any(|service| filter.contains(&service.uuid))
    }

    fn as_discovered(&self) -> DiscoveredDevice {
        DiscoveredDevice::new(self.id.clone(), self.name.clone(), self.rssi)
    }
}

// ----------------------------------------------------------------------------
// Simulated Central
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct CentralWorld {
    state: AdapterState,
    sender: Option<CentralEventSender>,
    calls: Vec<AdapterCall>,
    devices: Vec<SimulatedDevice>,
    auto_respond: bool,
    failing: bool,
    retrieve_failing: bool,
    scanning: bool,
}

impl CentralWorld {
    fn emit(&self, event: CentralEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.failing {
            Err(LinkError::platform(operation, "simulated failure"))
        } else {
            Ok(())
        }
    }

    fn device(&self, id: &DeviceId) -> Option<&SimulatedDevice> {
        self.devices.iter().find(|device| &device.id == id)
    }
}

/// Central-role adapter backed by an in-memory world
#[derive(Debug)]
pub struct SimulatedCentral {
    world: Arc<Mutex<CentralWorld>>,
}

/// Test-side handle onto a [`SimulatedCentral`]
#[derive(Debug, Clone)]
pub struct CentralController {
    world: Arc<Mutex<CentralWorld>>,
}

impl SimulatedCentral {
    /// Create an adapter in `state` that answers requests automatically
    pub fn new(state: AdapterState) -> (Self, CentralController) {
        let world = Arc::new(Mutex::new(CentralWorld {
            state,
            sender: None,
            calls: Vec::new(),
            devices: Vec::new(),
            auto_respond: true,
            failing: false,
            retrieve_failing: false,
            scanning: false,
        }));
        (
            Self {
                world: world.clone(),
            },
            CentralController { world },
        )
    }
}

impl CentralAdapter for SimulatedCentral {
    fn attach_events(&mut self, sender: CentralEventSender) -> Result<()> {
        lock(&self.world).sender = Some(sender);
        Ok(())
    }

    fn state(&self) -> AdapterState {
        lock(&self.world).state
    }

    fn start_scan(&mut self, services: &[Uuid]) -> Result<()> {
        let mut world = lock(&self.world);
        world.calls.push(AdapterCall::StartScan(services.to_vec()));
        world.check("start scan")?;
        world.scanning = true;
        if world.auto_respond {
            for device in &world.devices {
                if !device.connected_elsewhere && device.exposes_any(services) {
                    world.emit(CentralEvent::DeviceDiscovered {
                        device: device.as_discovered(),
                    });
                }
            }
        }
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<()> {
        let mut world = lock(&self.world);
        world.calls.push(AdapterCall::StopScan);
        world.scanning = false;
        Ok(())
    }

    fn retrieve_connected(&mut self, services: &[Uuid]) -> Result<Vec<DiscoveredDevice>> {
        let mut world = lock(&self.world);
        world
            .calls
            .push(AdapterCall::RetrieveConnected(services.to_vec()));
        world.check("retrieve connected")?;
        if world.retrieve_failing {
            return Err(LinkError::platform("retrieve connected", "simulated failure"));
        }
        Ok(world
            .devices
            .iter()
            .filter(|device| device.connected_elsewhere && device.exposes_any(services))
            .map(SimulatedDevice::as_discovered)
            .collect())
    }

    fn connect(&mut self, peripheral: &DeviceId) -> Result<()> {
        let mut world = lock(&self.world);
        world.calls.push(AdapterCall::Connect(peripheral.clone()));
        world.check("connect")?;
        if world.auto_respond {
            let event = match world.device(peripheral) {
                Some(_) => CentralEvent::Connected {
                    peripheral: peripheral.clone(),
                },
                None => CentralEvent::ConnectFailed {
                    peripheral: peripheral.clone(),
                    reason: "device out of range".to_string(),
                },
            };
            world.emit(event);
        }
        Ok(())
    }

    fn disconnect(&mut self, peripheral: &DeviceId) -> Result<()> {
        let mut world = lock(&self.world);
        world.calls.push(AdapterCall::Disconnect(peripheral.clone()));
        if world.auto_respond {
            world.emit(CentralEvent::Disconnected {
                peripheral: peripheral.clone(),
                reason: None,
            });
        }
        Ok(())
    }

    fn discover_services(&mut self, peripheral: &DeviceId, services: &[Uuid]) -> Result<()> {
        let mut world = lock(&self.world);
        world
            .calls
            .push(AdapterCall::DiscoverServices(peripheral.clone()));
        world.check("discover services")?;
        if world.auto_respond {
            let found = world
                .device(peripheral)
                .map(|device| {
                    device
                        .services
                        .iter()
                        .filter(|service| services.is_empty() || services.contains(&service.uuid))
                        .map(|service| ServiceHandle {
                            uuid: service.uuid,
                            primary: true,
                        })
                        .collect()
                })
                .ok_or_else(|| "unknown peripheral".to_string());
            world.emit(CentralEvent::ServicesDiscovered {
                peripheral: peripheral.clone(),
                result: found,
            });
        }
        Ok(())
    }

    fn discover_characteristics(
        &mut self,
        peripheral: &DeviceId,
        service: &ServiceHandle,
        characteristics: &[Uuid],
    ) -> Result<()> {
        let mut world = lock(&self.world);
        world.calls.push(AdapterCall::DiscoverCharacteristics {
            peripheral: peripheral.clone(),
            service: service.uuid,
        });
        world.check("discover characteristics")?;
        if world.auto_respond {
            let found = world
                .device(peripheral)
                .and_then(|device| device.services.iter().find(|s| s.uuid == service.uuid))
                .map(|simulated| {
                    simulated
                        .characteristics
                        .iter()
                        .filter(|(uuid, _)| {
                            characteristics.is_empty() || characteristics.contains(uuid)
                        })
                        .map(|(uuid, properties)| RemoteCharacteristic {
                            uuid: *uuid,
                            service_uuid: service.uuid,
                            properties: *properties,
                        })
                        .collect()
                })
                .ok_or_else(|| "unknown service".to_string());
            world.emit(CentralEvent::CharacteristicsDiscovered {
                peripheral: peripheral.clone(),
                service: service.clone(),
                result: found,
            });
        }
        Ok(())
    }

    fn set_notify(
        &mut self,
        peripheral: &DeviceId,
        characteristic: &RemoteCharacteristic,
        enabled: bool,
    ) -> Result<()> {
        let mut world = lock(&self.world);
        world.calls.push(AdapterCall::SetNotify {
            peripheral: peripheral.clone(),
            characteristic: characteristic.uuid,
            enabled,
        });
        world.check("set notify")
    }

    fn write(
        &mut self,
        peripheral: &DeviceId,
        characteristic: &RemoteCharacteristic,
        data: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        let mut world = lock(&self.world);
        world.calls.push(AdapterCall::Write {
            peripheral: peripheral.clone(),
            data: data.to_vec(),
            mode,
        });
        world.check("write")?;
        if world.auto_respond && mode == WriteMode::WithResponse {
            world.emit(CentralEvent::WriteCompleted {
                peripheral: peripheral.clone(),
                characteristic: characteristic.uuid,
                result: Ok(()),
            });
        }
        Ok(())
    }

    fn read_rssi(&mut self, peripheral: &DeviceId) -> Result<()> {
        let mut world = lock(&self.world);
        world.calls.push(AdapterCall::ReadRssi(peripheral.clone()));
        world.check("read rssi")?;
        if world.auto_respond {
            let result = world
                .device(peripheral)
                .and_then(|device| device.rssi)
                .ok_or_else(|| "RSSI unavailable".to_string());
            world.emit(CentralEvent::RssiRead {
                peripheral: peripheral.clone(),
                result,
            });
        }
        Ok(())
    }
}

impl CentralController {
    /// Change the power state and notify the attached coordinator
    pub fn set_state(&self, state: AdapterState) {
        let mut world = lock(&self.world);
        world.state = state;
        if !state.is_powered_on() {
            world.scanning = false;
        }
        world.emit(CentralEvent::StateChanged(state));
    }

    pub fn add_device(&self, device: SimulatedDevice) {
        lock(&self.world).devices.push(device);
    }

    /// Inject an arbitrary platform event
    pub fn emit(&self, event: CentralEvent) {
        lock(&self.world).emit(event);
    }

    /// Re-send a device's advertisement as if it was heard again
    pub fn readvertise(&self, id: &DeviceId, rssi: Option<i16>) {
        let world = lock(&self.world);
        if let Some(device) = world.device(id) {
            let mut discovered = device.as_discovered();
            discovered.signal_strength = rssi;
            world.emit(CentralEvent::DeviceDiscovered { device: discovered });
        }
    }

    /// Push a notification from a connected peripheral
    pub fn notify(&self, peripheral: &DeviceId, characteristic: Uuid, value: &[u8]) {
        self.emit(CentralEvent::ValueUpdated {
            peripheral: peripheral.clone(),
            characteristic,
            value: value.to_vec(),
        });
    }

    /// Drop a link from the remote side
    pub fn drop_link(&self, peripheral: &DeviceId, reason: &str) {
        self.emit(CentralEvent::Disconnected {
            peripheral: peripheral.clone(),
            reason: Some(reason.to_string()),
        });
    }

    pub fn set_auto_respond(&self, enabled: bool) {
        lock(&self.world).auto_respond = enabled;
    }

    /// Make every subsequent request fail synchronously
    pub fn set_failing(&self, failing: bool) {
        lock(&self.world).failing = failing;
    }

    /// Make only `retrieve_connected` fail
    pub fn set_retrieve_failing(&self, failing: bool) {
        lock(&self.world).retrieve_failing = failing;
    }

    pub fn is_scanning(&self) -> bool {
        lock(&self.world).scanning
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        lock(&self.world).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.world).calls.clear();
    }
}

// ----------------------------------------------------------------------------
// Simulated Peripheral
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct PeripheralWorld {
    state: AdapterState,
    sender: Option<PeripheralEventSender>,
    calls: Vec<AdapterCall>,
    auto_respond: bool,
    failing: bool,
    advertising: bool,
    next_request: u64,
}

impl PeripheralWorld {
    fn emit(&self, event: PeripheralEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.failing {
            Err(LinkError::platform(operation, "simulated failure"))
        } else {
            Ok(())
        }
    }

    fn request_id(&mut self) -> RequestId {
        self.next_request += 1;
        RequestId(self.next_request)
    }
}

/// Peripheral-role adapter backed by an in-memory GATT server
#[derive(Debug)]
pub struct SimulatedPeripheral {
    world: Arc<Mutex<PeripheralWorld>>,
}

/// Test-side handle onto a [`SimulatedPeripheral`]
#[derive(Debug, Clone)]
pub struct PeripheralController {
    world: Arc<Mutex<PeripheralWorld>>,
}

impl SimulatedPeripheral {
    pub fn new(state: AdapterState) -> (Self, PeripheralController) {
        let world = Arc::new(Mutex::new(PeripheralWorld {
            state,
            sender: None,
            calls: Vec::new(),
            auto_respond: true,
            failing: false,
            advertising: false,
            next_request: 0,
        }));
        (
            Self {
                world: world.clone(),
            },
            PeripheralController { world },
        )
    }
}

impl PeripheralAdapter for SimulatedPeripheral {
    fn attach_events(&mut self, sender: PeripheralEventSender) -> Result<()> {
        lock(&self.world).sender = Some(sender);
        Ok(())
    }

    fn state(&self) -> AdapterState {
        lock(&self.world).state
    }

    fn publish_service(&mut self, service: &LocalService) -> Result<()> {
        let mut world = lock(&self.world);
        world.calls.push(AdapterCall::PublishService(service.clone()));
        world.check("publish service")?;
        if world.auto_respond {
            world.emit(PeripheralEvent::ServiceAdded {
                service: service.uuid,
                result: Ok(()),
            });
        }
        Ok(())
    }

    fn start_advertising(&mut self, advertisement: &AdvertisementData) -> Result<()> {
        let mut world = lock(&self.world);
        world
            .calls
            .push(AdapterCall::StartAdvertising(advertisement.clone()));
        world.check("start advertising")?;
        world.advertising = true;
        if world.auto_respond {
            world.emit(PeripheralEvent::AdvertisingStarted { result: Ok(()) });
        }
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<()> {
        let mut world = lock(&self.world);
        world.calls.push(AdapterCall::StopAdvertising);
        world.advertising = false;
        Ok(())
    }

    fn update_value(
        &mut self,
        characteristic: Uuid,
        value: &[u8],
        subscribers: Option<&[CentralId]>,
    ) -> Result<()> {
        let mut world = lock(&self.world);
        world.calls.push(AdapterCall::UpdateValue {
            characteristic,
            value: value.to_vec(),
            subscribers: subscribers.map(<[CentralId]>::to_vec),
        });
        world.check("update value")
    }

    fn respond(&mut self, request: RequestId, result: AttResult, value: Option<&[u8]>) -> Result<()> {
        let mut world = lock(&self.world);
        world.calls.push(AdapterCall::Respond {
            request,
            result,
            value: value.map(<[u8]>::to_vec),
        });
        world.check("respond")
    }
}

impl PeripheralController {
    pub fn set_state(&self, state: AdapterState) {
        let mut world = lock(&self.world);
        world.state = state;
        if !state.is_powered_on() {
            world.advertising = false;
        }
        world.emit(PeripheralEvent::StateChanged(state));
    }

    pub fn emit(&self, event: PeripheralEvent) {
        lock(&self.world).emit(event);
    }

    pub fn subscribe(&self, central: impl Into<CentralId>, characteristic: Uuid) {
        self.emit(PeripheralEvent::Subscribed {
            central: central.into(),
            characteristic,
        });
    }

    pub fn unsubscribe(&self, central: impl Into<CentralId>, characteristic: Uuid) {
        self.emit(PeripheralEvent::Unsubscribed {
            central: central.into(),
            characteristic,
        });
    }

    /// Deliver one write batch; returns the request ids in batch order
    pub fn write(&self, writes: Vec<(CentralId, Uuid, Option<Vec<u8>>)>) -> Vec<RequestId> {
        let mut world = lock(&self.world);
        let mut ids = Vec::with_capacity(writes.len());
        let requests = writes
            .into_iter()
            .map(|(central, characteristic, value)| {
                let id = world.request_id();
                ids.push(id);
                WriteRequest {
                    id,
                    central,
                    characteristic,
                    value,
                    offset: 0,
                }
            })
            .collect();
        world.emit(PeripheralEvent::WriteRequests(requests));
        ids
    }

    pub fn read(&self, central: impl Into<CentralId>, characteristic: Uuid, offset: usize) -> RequestId {
        let mut world = lock(&self.world);
        let id = world.request_id();
        world.emit(PeripheralEvent::ReadRequest(ReadRequest {
            id,
            central: central.into(),
            characteristic,
            offset,
        }));
        id
    }

    pub fn set_auto_respond(&self, enabled: bool) {
        lock(&self.world).auto_respond = enabled;
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.world).failing = failing;
    }

    pub fn is_advertising(&self) -> bool {
        lock(&self.world).advertising
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        lock(&self.world).calls.clone()
    }

    /// Only the value pushes, in order
    pub fn updates(&self) -> Vec<AdapterCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, AdapterCall::UpdateValue { .. }))
            .collect()
    }

    /// Only the request responses, in order
    pub fn responses(&self) -> Vec<AdapterCall> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, AdapterCall::Respond { .. }))
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.world).calls.clear();
    }
}

// ----------------------------------------------------------------------------
// Test Drivers
// ----------------------------------------------------------------------------

/// Feed every queued event into the coordinator, including events the
/// coordinator's own requests enqueue; returns how many were handled
pub fn drain_central<A: CentralAdapter>(
    coordinator: &mut CentralCoordinator<A>,
    receiver: &mut CentralEventReceiver,
) -> usize {
    let mut handled = 0;
    while let Ok(event) = receiver.try_recv() {
        coordinator.handle_event(event);
        handled += 1;
    }
    handled
}

/// Peripheral counterpart of [`drain_central`]
pub fn drain_peripheral<A: PeripheralAdapter>(
    advertiser: &mut PeripheralAdvertiser<A>,
    receiver: &mut PeripheralEventReceiver,
) -> usize {
    let mut handled = 0;
    while let Ok(event) = receiver.try_recv() {
        advertiser.handle_event(event);
        handled += 1;
    }
    handled
}

/// Delegate that records every callback; clones share one log
#[derive(Debug, Clone, Default)]
pub struct RecordingDelegate {
    events: Arc<Mutex<Vec<LinkEvent>>>,
}

impl RecordingDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LinkEvent> {
        lock(&self.events).clone()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
    }

    /// Identifiers reported through `on_device_discovered`, in order
    pub fn discovered(&self) -> Vec<DeviceId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LinkEvent::DeviceDiscovered { device, .. } => Some(device.id),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<LinkError> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LinkEvent::Error(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn received(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LinkEvent::DataReceived { payload } => Some(payload),
                _ => None,
            })
            .collect()
    }

    pub fn established(&self) -> Vec<DeviceId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                LinkEvent::ConnectionEstablished { peripheral } => Some(peripheral),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: LinkEvent) {
        lock(&self.events).push(event);
    }
}

impl LinkDelegate for RecordingDelegate {
    fn on_device_discovered(&mut self, device: &DiscoveredDevice, signal_strength: Option<i16>) {
        self.push(LinkEvent::DeviceDiscovered {
            device: device.clone(),
            signal_strength,
        });
    }

    fn on_connection_established(&mut self, peripheral: &DeviceId) {
        self.push(LinkEvent::ConnectionEstablished {
            peripheral: peripheral.clone(),
        });
    }

    fn on_data_received(&mut self, payload: &[u8]) {
        self.push(LinkEvent::DataReceived {
            payload: payload.to_vec(),
        });
    }

    fn on_disconnected(&mut self, peripheral: &DeviceId) {
        self.push(LinkEvent::Disconnected {
            peripheral: peripheral.clone(),
        });
    }

    fn on_error(&mut self, error: &LinkError) {
        self.push(LinkEvent::Error(error.clone()));
    }

    fn on_signal_strength(&mut self, peripheral: &DeviceId, rssi: i16) {
        self.push(LinkEvent::SignalStrength {
            peripheral: peripheral.clone(),
            rssi,
        });
    }

    fn on_central_state_changed(&mut self, state: CentralState) {
        self.push(LinkEvent::CentralStateChanged(state));
    }

    fn on_peripheral_state_changed(&mut self, state: PeripheralState) {
        self.push(LinkEvent::PeripheralStateChanged(state));
    }

    fn on_subscribed(&mut self, central: &CentralId) {
        self.push(LinkEvent::Subscribed {
            central: central.clone(),
        });
    }

    fn on_unsubscribed(&mut self, central: &CentralId) {
        self.push(LinkEvent::Unsubscribed {
            central: central.clone(),
        });
    }
}
