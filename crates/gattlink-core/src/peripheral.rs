//! Peripheral advertiser: publish, advertise, serve subscribers
//!
//! Mirrors [`crate::central::CentralCoordinator`] for the peripheral role. The
//! advertiser republishes its service every time the adapter powers on and goes
//! inert as soon as it leaves that state.

use tracing::{debug, info, warn};

use crate::adapter::{PeripheralAdapter, PeripheralEvent};
use crate::config::LinkConfig;
use crate::delegate::LinkDelegate;
use crate::errors::{LinkError, Result};
use crate::protocol::DisplayUuid;
use crate::types::{
    AdapterState, AdvertisementData, AttResult, AttributePermissions, CentralId,
    CharacteristicProperties, LocalCharacteristic, LocalService, PeripheralState, ReadRequest,
    RequestId, WriteRequest,
};

// ----------------------------------------------------------------------------
// Value Producers
// ----------------------------------------------------------------------------

/// Source of the payload pushed to new subscribers and returned to reads
pub trait ValueProducer: Send {
    fn current_value(&mut self) -> Vec<u8>;
}

impl<F> ValueProducer for F
where
    F: FnMut() -> Vec<u8> + Send,
{
    fn current_value(&mut self) -> Vec<u8> {
        self()
    }
}

/// Producer that always yields the same bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticValue(Vec<u8>);

impl StaticValue {
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self(value.into())
    }
}

impl ValueProducer for StaticValue {
    fn current_value(&mut self) -> Vec<u8> {
        self.0.clone()
    }
}

// ----------------------------------------------------------------------------
// Peripheral Advertiser
// ----------------------------------------------------------------------------

/// Publication and subscription manager for the peripheral role
pub struct PeripheralAdvertiser<A: PeripheralAdapter> {
    config: LinkConfig,
    adapter: A,
    delegate: Box<dyn LinkDelegate>,
    producer: Box<dyn ValueProducer>,
    state: PeripheralState,
    adapter_state: AdapterState,
    subscribers: Vec<CentralId>,
}

impl<A: PeripheralAdapter> PeripheralAdvertiser<A> {
    /// Create an advertiser that greets subscribers with the configured greeting
    pub fn new(config: LinkConfig, adapter: A, delegate: Box<dyn LinkDelegate>) -> Self {
        let producer = StaticValue::new(config.greeting.clone().into_bytes());
        let adapter_state = adapter.state();
        Self {
            config,
            adapter,
            delegate,
            producer: Box::new(producer),
            state: PeripheralState::Unpublished,
            adapter_state,
            subscribers: Vec::new(),
        }
    }

    /// Replace the payload source
    pub fn with_value_producer(mut self, producer: impl ValueProducer + 'static) -> Self {
        self.producer = Box::new(producer);
        self
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> PeripheralState {
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

    /// Centrals currently subscribed, in subscription order
    pub fn subscribers(&self) -> &[CentralId] {
        &self.subscribers
    }

    // ------------------------------------------------------------------------
    // Caller Operations
    // ------------------------------------------------------------------------

    /// Resume advertising, publishing the service first if needed
    pub fn start_advertising(&mut self) -> Result<()> {
        self.ensure_powered_on()?;
        match self.state {
            PeripheralState::Unpublished => self.publish(),
            PeripheralState::Published { advertising: true } => Ok(()),
            PeripheralState::Published { advertising: false } => {
                self.adapter.start_advertising(&self.advertisement())?;
                self.transition(PeripheralState::Published { advertising: true });
                info!("Resumed advertising");
                Ok(())
            }
        }
    }

    /// Stop advertising; the service stays published for existing subscribers
    pub fn stop_advertising(&mut self) -> Result<()> {
        if self.state != (PeripheralState::Published { advertising: true }) {
            debug!("Stop advertising ignored in state {}", self.state);
            return Ok(());
        }
        self.adapter.stop_advertising()?;
        self.transition(PeripheralState::Published { advertising: false });
        info!("Stopped advertising");
        Ok(())
    }

    /// Push `payload` to every subscriber, returning how many were targeted
    pub fn notify_subscribers(&mut self, payload: &[u8]) -> Result<usize> {
        if !self.state.is_published() {
            return Err(LinkError::AdapterNotReady {
                state: self.adapter_state,
            });
        }
        if self.subscribers.is_empty() {
            debug!("No subscribers to notify");
            return Ok(0);
        }
        self.adapter
            .update_value(self.config.characteristic_uuid, payload, None)?;
        debug!(
            "Pushed {} bytes to {} subscriber(s)",
            payload.len(),
            self.subscribers.len()
        );
        Ok(self.subscribers.len())
    }

    // ------------------------------------------------------------------------
    // Adapter Events
    // ------------------------------------------------------------------------

    /// Apply one platform notification
    pub fn handle_event(&mut self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::StateChanged(state) => self.on_adapter_state(state),
            PeripheralEvent::ServiceAdded { service, result } => {
                if let Err(reason) = result {
                    warn!("Publishing {} failed: {}", DisplayUuid(&service), reason);
                    if let Err(e) = self.adapter.stop_advertising() {
                        warn!("Failed to stop advertising: {}", e);
                    }
                    self.subscribers.clear();
                    self.transition(PeripheralState::Unpublished);
                    self.delegate
                        .on_error(&LinkError::platform("publish service", reason));
                }
            }
            PeripheralEvent::AdvertisingStarted { result } => match result {
                Ok(()) => debug!("Advertising confirmed"),
                Err(reason) => {
                    warn!("Advertising failed: {}", reason);
                    if self.state.is_published() {
                        self.transition(PeripheralState::Published { advertising: false });
                    }
                    self.delegate
                        .on_error(&LinkError::platform("start advertising", reason));
                }
            },
            PeripheralEvent::Subscribed {
                central,
                characteristic,
            } => {
                if characteristic == self.config.characteristic_uuid {
                    self.on_subscribed(central);
                }
            }
            PeripheralEvent::Unsubscribed {
                central,
                characteristic,
            } => {
                if characteristic == self.config.characteristic_uuid {
                    self.on_unsubscribed(central);
                }
            }
            PeripheralEvent::WriteRequests(requests) => self.on_write_requests(requests),
            PeripheralEvent::ReadRequest(request) => self.on_read_request(request),
        }
    }

    fn on_adapter_state(&mut self, state: AdapterState) {
        info!("Adapter state changed: {} -> {}", self.adapter_state, state);
        self.adapter_state = state;
        self.subscribers.clear();

        if state.is_powered_on() {
            self.transition(PeripheralState::Unpublished);
            if let Err(e) = self.publish() {
                warn!("Publishing after power-on failed: {}", e);
                self.delegate.on_error(&e);
            }
        } else {
            warn!("Bluetooth is not available ({})", state);
            self.transition(PeripheralState::Unpublished);
        }
    }

    fn on_subscribed(&mut self, central: CentralId) {
        if !self.state.is_published() {
            debug!("Ignoring subscription from {} while unpublished", central);
            return;
        }
        if !self.subscribers.contains(&central) {
            self.subscribers.push(central.clone());
        }
        info!("Central {} subscribed", central);
        self.delegate.on_subscribed(&central);

        let value = self.producer.current_value();
        let target = [central];
        if let Err(e) =
            self.adapter
                .update_value(self.config.characteristic_uuid, &value, Some(&target))
        {
            warn!("Initial push to {} failed: {}", target[0], e);
            self.delegate.on_error(&e);
        }
    }

    fn on_unsubscribed(&mut self, central: CentralId) {
        let before = self.subscribers.len();
        self.subscribers.retain(|known| known != &central);
        if self.subscribers.len() == before {
            debug!("Ignoring unsubscribe from unknown central {}", central);
            return;
        }
        info!("Central {} unsubscribed", central);
        self.delegate.on_unsubscribed(&central);
    }

    /// Deliver matching payloads, then acknowledge the whole batch
    fn on_write_requests(&mut self, requests: Vec<WriteRequest>) {
        for request in &requests {
            match &request.value {
                Some(value) if request.characteristic == self.config.characteristic_uuid => {
                    debug!("Received {} bytes from {}", value.len(), request.central);
                    self.delegate.on_data_received(value);
                }
                _ => debug!(
                    "Write to {} from {} not delivered",
                    DisplayUuid(&request.characteristic),
                    request.central
                ),
            }
        }
        for request in &requests {
            self.respond(request.id, AttResult::Success, None);
        }
    }

    fn on_read_request(&mut self, request: ReadRequest) {
        if request.characteristic != self.config.characteristic_uuid {
            self.respond(request.id, AttResult::Success, None);
            return;
        }
        let value = self.producer.current_value();
        match value.get(request.offset..) {
            Some(tail) => self.respond(request.id, AttResult::Success, Some(tail)),
            None => self.respond(request.id, AttResult::InvalidOffset, None),
        }
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

    fn local_service(&self) -> LocalService {
        LocalService {
            uuid: self.config.service_uuid,
            primary: true,
            characteristics: vec![LocalCharacteristic {
                uuid: self.config.characteristic_uuid,
                properties: CharacteristicProperties::notify_read_write(),
                permissions: AttributePermissions {
                    readable: true,
                    writeable: true,
                },
                value: None,
            }],
        }
    }

    fn advertisement(&self) -> AdvertisementData {
        AdvertisementData {
            local_name: Some(self.config.local_name.clone()),
            service_uuids: vec![self.config.service_uuid],
        }
    }

    fn publish(&mut self) -> Result<()> {
        let service = self.local_service();
        self.adapter.publish_service(&service)?;
        self.transition(PeripheralState::Published { advertising: false });

        self.adapter.start_advertising(&self.advertisement())?;
        self.transition(PeripheralState::Published { advertising: true });
        info!(
            "Advertising service {} as {}",
            DisplayUuid(&self.config.service_uuid),
            self.config.local_name
        );
        Ok(())
    }

    fn respond(&mut self, request: RequestId, result: AttResult, value: Option<&[u8]>) {
        if let Err(e) = self.adapter.respond(request, result, value) {
            warn!("Responding to request {:?} failed: {}", request, e);
            self.delegate.on_error(&e);
        }
    }

    fn transition(&mut self, next: PeripheralState) {
        if self.state == next {
            return;
        }
        debug!("Peripheral state {} -> {}", self.state, next);
        self.state = next;
        self.delegate.on_peripheral_state_changed(next);
    }
}
