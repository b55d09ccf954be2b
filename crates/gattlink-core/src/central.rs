//! Central coordinator: scan, connect, discover, subscribe
//!
//! The coordinator is a plain state machine. It never waits on the platform:
//! requests go out through the [`CentralAdapter`] and completions come back
//! through [`CentralCoordinator::handle_event`], one at a time, in arrival
//! order. Whoever owns the coordinator owns the adapter, so there is exactly
//! one lifecycle per adapter instance.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::adapter::{CentralAdapter, CentralEvent};
use crate::config::LinkConfig;
use crate::delegate::LinkDelegate;
use crate::errors::{LinkError, Result};
use crate::protocol::DisplayUuid;
use crate::types::{
    AdapterState, CentralState, ConnectedSession, DeviceId, DiscoveredDevice,
    RemoteCharacteristic, ServiceHandle, WriteMode,
};

// ----------------------------------------------------------------------------
// Central Coordinator
// ----------------------------------------------------------------------------

/// Connection-lifecycle manager for the central role
pub struct CentralCoordinator<A: CentralAdapter> {
    config: LinkConfig,
    adapter: A,
    delegate: Box<dyn LinkDelegate>,
    state: CentralState,
    adapter_state: AdapterState,
    /// Current scan session, in first-seen order
    discovered: Vec<DiscoveredDevice>,
    /// Connect request in flight
    pending: Option<DeviceId>,
    /// Connected peripheral still going through discovery
    link: Option<DeviceId>,
    /// Characteristic discoveries not yet answered
    outstanding_discoveries: usize,
    session: Option<ConnectedSession>,
}

impl<A: CentralAdapter> CentralCoordinator<A> {
    /// Create a coordinator mirroring the adapter's current power state
    pub fn new(config: LinkConfig, adapter: A, delegate: Box<dyn LinkDelegate>) -> Self {
        let adapter_state = adapter.state();
        Self {
            config,
            adapter,
            delegate,
            state: CentralState::Idle,
            adapter_state,
            discovered: Vec::new(),
            pending: None,
            link: None,
            outstanding_discoveries: 0,
            session: None,
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> CentralState {
        self.state
    }

    pub fn adapter_state(&self) -> AdapterState {
        self.adapter_state
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn pending_connection(&self) -> Option<&DeviceId> {
        self.pending.as_ref()
    }

    /// Peripheral currently linked, whether or not discovery has finished
    pub fn connected_peripheral(&self) -> Option<&DeviceId> {
        self.session
            .as_ref()
            .map(|session| &session.peripheral)
            .or(self.link.as_ref())
    }

    pub fn session(&self) -> Option<&ConnectedSession> {
        self.session.as_ref()
    }

    /// Devices of the current scan session, ascending by signal strength
    pub fn list_discovered_devices(&self) -> Vec<DiscoveredDevice> {
        let mut devices = self.discovered.clone();
        devices.sort_by_key(DiscoveredDevice::sort_key);
        devices
    }

    // ------------------------------------------------------------------------
    // Caller Operations
    // ------------------------------------------------------------------------

    /// Start a filtered scan session and report already-connected matches
    pub fn start_scan(&mut self) -> Result<()> {
        self.ensure_powered_on()?;

        match self.state {
            CentralState::Idle => {}
            CentralState::Scanning => {
                debug!("Scan already running");
                return Ok(());
            }
            CentralState::Ready => {
                return Err(LinkError::AlreadyConnected {
                    peripheral: self.busy_peripheral(),
                })
            }
            _ => {
                return Err(LinkError::ConnectionInProgress {
                    peripheral: self.busy_peripheral(),
                })
            }
        }

        let services = [self.config.service_uuid];
        self.adapter.start_scan(&services)?;
        self.discovered.clear();
        self.transition(CentralState::Scanning);
        info!(
            "Started scanning for service {}",
            DisplayUuid(&self.config.service_uuid)
        );

        // Already-connected devices never advertise, so they skip the proximity gate
        let retrieved = match self.adapter.retrieve_connected(&services) {
            Ok(retrieved) => retrieved,
            Err(e) => {
                // The scan itself is running, so only the bonded lookup is lost
                warn!("Retrieving connected peripherals failed: {}", e);
                self.delegate.on_error(&e);
                Vec::new()
            }
        };
        for device in retrieved {
            self.record_discovery(DiscoveredDevice {
                signal_strength: None,
                ..device
            });
        }
        Ok(())
    }

    /// Stop the scan session; safe to call in any state
    pub fn stop_scan(&mut self) -> Result<()> {
        if self.state != CentralState::Scanning {
            debug!("Stop scan ignored in state {}", self.state);
            return Ok(());
        }
        self.transition(CentralState::Idle);
        self.adapter.stop_scan()?;
        info!("Stopped scanning");
        Ok(())
    }

    /// Connect to a device discovered in the current session
    pub fn connect(&mut self, peripheral: &DeviceId) -> Result<()> {
        self.ensure_powered_on()?;

        if let Some(pending) = &self.pending {
            return Err(LinkError::ConnectionInProgress {
                peripheral: pending.clone(),
            });
        }
        if let Some(connected) = self.connected_peripheral() {
            return Err(LinkError::AlreadyConnected {
                peripheral: connected.clone(),
            });
        }
        if !self.discovered.iter().any(|device| &device.id == peripheral) {
            return Err(LinkError::UnknownDevice {
                device: peripheral.clone(),
            });
        }

        if self.state == CentralState::Scanning {
            if let Err(e) = self.adapter.stop_scan() {
                warn!("Failed to stop scan before connecting: {}", e);
            }
        }

        if let Err(e) = self.adapter.connect(peripheral) {
            // The scan is gone either way
            self.transition(CentralState::Idle);
            return Err(e);
        }
        self.pending = Some(peripheral.clone());
        self.transition(CentralState::Connecting);
        info!("Connecting to {}", peripheral);
        Ok(())
    }

    /// Tear down the pending connection or the current session
    pub fn disconnect(&mut self) -> Result<()> {
        let peripheral = self
            .connected_peripheral()
            .or(self.pending.as_ref())
            .cloned()
            .ok_or(LinkError::NotConnected)?;

        let result = self.adapter.disconnect(&peripheral);
        self.clear_connection();
        self.transition(CentralState::Idle);
        self.delegate.on_disconnected(&peripheral);
        info!("Disconnected from {}", peripheral);
        result
    }

    /// Write to the session characteristic using its negotiated write mode
    pub fn write(&mut self, payload: &[u8]) -> Result<()> {
        let session = self.session.as_ref().ok_or(LinkError::NotConnected)?;
        self.adapter.write(
            &session.peripheral,
            &session.characteristic,
            payload,
            session.write_mode,
        )?;
        debug!(
            "Wrote {} bytes to {} ({:?})",
            payload.len(),
            session.peripheral,
            session.write_mode
        );
        Ok(())
    }

    /// Ask for the signal strength of the connected peripheral
    pub fn read_rssi(&mut self) -> Result<()> {
        let session = self.session.as_ref().ok_or(LinkError::NotConnected)?;
        self.adapter.read_rssi(&session.peripheral)
    }

    /// Abandon a discovery that never completed
    pub fn discovery_timed_out(&mut self) {
        if !self.state.is_discovering() {
            return;
        }
        if let Some(peripheral) = self.link.clone() {
            let duration_ms = self.config.discovery_timeout_ms;
            warn!("Discovery on {} stalled in {}", peripheral, self.state);
            self.fail_connection(LinkError::DiscoveryTimeout {
                peripheral,
                duration_ms,
            });
        }
    }

    // ------------------------------------------------------------------------
    // Adapter Events
    // ------------------------------------------------------------------------

    /// Apply one platform notification
    pub fn handle_event(&mut self, event: CentralEvent) {
        match event {
            CentralEvent::StateChanged(state) => self.on_adapter_state(state),
            CentralEvent::DeviceDiscovered { device } => self.on_advertisement(device),
            CentralEvent::Connected { peripheral } => self.on_connected(peripheral),
            CentralEvent::ConnectFailed { peripheral, reason } => {
                self.on_connect_failed(peripheral, reason)
            }
            CentralEvent::Disconnected { peripheral, reason } => {
                self.on_disconnected(peripheral, reason)
            }
            CentralEvent::ServicesDiscovered { peripheral, result } => {
                self.on_services_discovered(peripheral, result)
            }
            CentralEvent::CharacteristicsDiscovered {
                peripheral,
                service,
                result,
            } => self.on_characteristics_discovered(peripheral, service, result),
            CentralEvent::ValueUpdated {
                peripheral,
                characteristic,
                value,
            } => self.on_value(peripheral, characteristic, value),
            CentralEvent::WriteCompleted {
                peripheral, result, ..
            } => {
                if let Err(reason) = result {
                    warn!("Write to {} failed: {}", peripheral, reason);
                    self.delegate.on_error(&LinkError::platform("write", reason));
                }
            }
            CentralEvent::RssiRead { peripheral, result } => match result {
                Ok(rssi) => self.delegate.on_signal_strength(&peripheral, rssi),
                Err(reason) => {
                    warn!("RSSI read on {} failed: {}", peripheral, reason);
                    self.delegate.on_error(&LinkError::platform("rssi read", reason));
                }
            },
            CentralEvent::PlatformError { operation, reason } => {
                warn!("Platform error during {}: {}", operation, reason);
                self.delegate.on_error(&LinkError::Platform { operation, reason });
            }
        }
    }

    fn on_adapter_state(&mut self, state: AdapterState) {
        info!("Adapter state changed: {} -> {}", self.adapter_state, state);
        self.adapter_state = state;

        // Any state update invalidates whatever link was in progress
        if let Some(peripheral) = self.connected_peripheral().or(self.pending.as_ref()).cloned() {
            self.clear_connection();
            self.delegate.on_error(&LinkError::ConnectionLost {
                peripheral: peripheral.clone(),
                reason: format!("adapter {}", state),
            });
            self.delegate.on_disconnected(&peripheral);
        }
        self.discovered.clear();
        self.transition(CentralState::Idle);

        if state.is_powered_on() {
            if let Err(e) = self.start_scan() {
                warn!("Automatic scan after power-on failed: {}", e);
                self.delegate.on_error(&e);
            }
        } else if let Err(e) = self.adapter.stop_scan() {
            debug!("Stop scan while {} reported: {}", state, e);
        }
    }

    fn on_advertisement(&mut self, device: DiscoveredDevice) {
        if self.state != CentralState::Scanning {
            debug!("Ignoring advertisement from {} outside a scan", device.id);
            return;
        }
        match device.signal_strength {
            Some(rssi) if rssi > self.config.rssi_threshold => self.record_discovery(device),
            Some(rssi) => debug!("Peripheral {} RSSI too low: {}", device.id, rssi),
            None => debug!("Peripheral {} advertised without RSSI", device.id),
        }
    }

    fn on_connected(&mut self, peripheral: DeviceId) {
        if self.pending.as_ref() != Some(&peripheral) {
            warn!("Unexpected connection from {}", peripheral);
            return;
        }
        self.pending = None;
        self.link = Some(peripheral.clone());
        self.transition(CentralState::ServiceDiscovery);
        info!("Connected to {}, discovering services", peripheral);

        let services = [self.config.service_uuid];
        if let Err(e) = self.adapter.discover_services(&peripheral, &services) {
            self.fail_connection(e);
        }
    }

    fn on_connect_failed(&mut self, peripheral: DeviceId, reason: String) {
        if self.pending.as_ref() != Some(&peripheral) {
            debug!("Ignoring connect failure for {}", peripheral);
            return;
        }
        warn!("Failed to connect to {}: {}", peripheral, reason);
        self.clear_connection();
        self.transition(CentralState::Idle);
        self.delegate
            .on_error(&LinkError::ConnectionFailed { peripheral, reason });
    }

    fn on_disconnected(&mut self, peripheral: DeviceId, reason: Option<String>) {
        let ours = self.connected_peripheral() == Some(&peripheral)
            || self.pending.as_ref() == Some(&peripheral);
        if !ours {
            debug!("Ignoring disconnect of {}", peripheral);
            return;
        }
        let reason = reason.unwrap_or_else(|| "disconnected by peer".to_string());
        warn!("Connection to {} lost: {}", peripheral, reason);
        self.clear_connection();
        self.transition(CentralState::Idle);
        self.delegate.on_error(&LinkError::ConnectionLost {
            peripheral: peripheral.clone(),
            reason,
        });
        self.delegate.on_disconnected(&peripheral);
    }

    fn on_services_discovered(
        &mut self,
        peripheral: DeviceId,
        result: std::result::Result<Vec<ServiceHandle>, String>,
    ) {
        if self.state != CentralState::ServiceDiscovery || self.link.as_ref() != Some(&peripheral) {
            debug!("Ignoring stale service discovery for {}", peripheral);
            return;
        }

        let services = match result {
            Ok(services) => services,
            Err(reason) => {
                self.fail_connection(LinkError::platform("service discovery", reason));
                return;
            }
        };

        let matching: Vec<ServiceHandle> = services
            .into_iter()
            .filter(|service| service.uuid == self.config.service_uuid)
            .collect();
        if matching.is_empty() {
            let uuid = self.config.service_uuid;
            self.fail_connection(LinkError::NoMatchingService { peripheral, uuid });
            return;
        }

        self.transition(CentralState::CharacteristicDiscovery);
        let characteristics = [self.config.characteristic_uuid];
        for service in &matching {
            if let Err(e) =
                self.adapter
                    .discover_characteristics(&peripheral, service, &characteristics)
            {
                self.fail_connection(e);
                return;
            }
            self.outstanding_discoveries += 1;
        }
        debug!(
            "Discovering characteristics in {} service(s) on {}",
            matching.len(),
            peripheral
        );
    }

    fn on_characteristics_discovered(
        &mut self,
        peripheral: DeviceId,
        service: ServiceHandle,
        result: std::result::Result<Vec<RemoteCharacteristic>, String>,
    ) {
        if self.state != CentralState::CharacteristicDiscovery
            || self.link.as_ref() != Some(&peripheral)
        {
            debug!("Ignoring stale characteristic discovery for {}", peripheral);
            return;
        }
        self.outstanding_discoveries = self.outstanding_discoveries.saturating_sub(1);

        let characteristics = match result {
            Ok(characteristics) => characteristics,
            Err(reason) => {
                warn!(
                    "Characteristic discovery in {} failed: {}",
                    DisplayUuid(&service.uuid),
                    reason
                );
                if self.outstanding_discoveries == 0 {
                    self.fail_connection(LinkError::platform("characteristic discovery", reason));
                }
                return;
            }
        };

        let wanted = self.config.characteristic_uuid;
        let Some(characteristic) = characteristics.into_iter().find(|c| c.uuid == wanted) else {
            if self.outstanding_discoveries == 0 {
                self.fail_connection(LinkError::NoMatchingCharacteristic {
                    peripheral,
                    uuid: wanted,
                });
            }
            return;
        };

        if let Err(e) = self.adapter.set_notify(&peripheral, &characteristic, true) {
            self.fail_connection(e);
            return;
        }

        let write_mode = WriteMode::from_properties(&characteristic.properties);
        self.link = None;
        self.outstanding_discoveries = 0;
        self.session = Some(ConnectedSession {
            peripheral: peripheral.clone(),
            service,
            characteristic,
            write_mode,
        });
        self.transition(CentralState::Ready);
        info!("Link to {} ready ({:?})", peripheral, write_mode);
        self.delegate.on_connection_established(&peripheral);
    }

    fn on_value(&mut self, peripheral: DeviceId, characteristic: Uuid, value: Vec<u8>) {
        let subscribed = self.session.as_ref().is_some_and(|session| {
            session.peripheral == peripheral && session.characteristic.uuid == characteristic
        });
        if !subscribed {
            debug!(
                "Ignoring value for {} from {}",
                DisplayUuid(&characteristic),
                peripheral
            );
            return;
        }
        self.delegate.on_data_received(&value);
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn ensure_powered_on(&self) -> Result<()> {
        if self.adapter_state.is_powered_on() {
            Ok(())
        } else {
            Err(LinkError::AdapterNotReady {
                state: self.adapter_state,
            })
        }
    }

    /// First sighting wins; rediscoveries do not refresh the entry
    fn record_discovery(&mut self, device: DiscoveredDevice) {
        if self.discovered.iter().any(|known| known.id == device.id) {
            return;
        }
        debug!(
            "Discovered peripheral: {} ({}) at RSSI {:?}",
            device.display_name(),
            device.id,
            device.signal_strength
        );
        self.delegate
            .on_device_discovered(&device, device.signal_strength);
        self.discovered.push(device);
    }

    fn busy_peripheral(&self) -> DeviceId {
        self.connected_peripheral()
            .or(self.pending.as_ref())
            .cloned()
            .unwrap_or_else(|| DeviceId::new("unknown"))
    }

    fn clear_connection(&mut self) {
        self.pending = None;
        self.link = None;
        self.session = None;
        self.outstanding_discoveries = 0;
    }

    /// Drop the link after a discovery failure and surface the error
    fn fail_connection(&mut self, error: LinkError) {
        if let Some(peripheral) = self.connected_peripheral().cloned() {
            if let Err(e) = self.adapter.disconnect(&peripheral) {
                debug!("Disconnect after failure on {} reported: {}", peripheral, e);
            }
        }
        warn!("Connection attempt abandoned: {}", error);
        self.clear_connection();
        self.transition(CentralState::Idle);
        self.delegate.on_error(&error);
    }

    fn transition(&mut self, next: CentralState) {
        if self.state == next {
            return;
        }
        debug!("Central state {} -> {}", self.state, next);
        self.state = next;
        self.delegate.on_central_state_changed(next);
    }
}
