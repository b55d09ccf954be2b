//! Event delegate port
//!
//! Callers implement only the capabilities they care about; every method has a
//! no-op default. [`ChannelDelegate`] turns the callbacks into a stream of
//! [`LinkEvent`] values for callers that prefer to consume a channel.

use tokio::sync::mpsc;
use tracing::trace;

use crate::errors::LinkError;
use crate::types::{CentralId, CentralState, DeviceId, DiscoveredDevice, PeripheralState};

// ----------------------------------------------------------------------------
// Delegate Trait
// ----------------------------------------------------------------------------

/// Observer of central and peripheral lifecycle events
pub trait LinkDelegate: Send {
    /// A device passed the proximity gate for the first time this session
    fn on_device_discovered(&mut self, _device: &DiscoveredDevice, _signal_strength: Option<i16>) {}

    /// Discovery matched the configured characteristic and notifications are on
    fn on_connection_established(&mut self, _peripheral: &DeviceId) {}

    /// A notification (central role) or accepted write (peripheral role) arrived
    fn on_data_received(&mut self, _payload: &[u8]) {}

    fn on_disconnected(&mut self, _peripheral: &DeviceId) {}

    fn on_error(&mut self, _error: &LinkError) {}

    fn on_signal_strength(&mut self, _peripheral: &DeviceId, _rssi: i16) {}

    fn on_central_state_changed(&mut self, _state: CentralState) {}

    fn on_peripheral_state_changed(&mut self, _state: PeripheralState) {}

    fn on_subscribed(&mut self, _central: &CentralId) {}

    fn on_unsubscribed(&mut self, _central: &CentralId) {}
}

/// Delegate that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDelegate;

impl LinkDelegate for NoopDelegate {}

// ----------------------------------------------------------------------------
// Channel Delegate
// ----------------------------------------------------------------------------

/// Delegate callbacks as values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    DeviceDiscovered {
        device: DiscoveredDevice,
        signal_strength: Option<i16>,
    },
    ConnectionEstablished {
        peripheral: DeviceId,
    },
    DataReceived {
        payload: Vec<u8>,
    },
    Disconnected {
        peripheral: DeviceId,
    },
    Error(LinkError),
    SignalStrength {
        peripheral: DeviceId,
        rssi: i16,
    },
    CentralStateChanged(CentralState),
    PeripheralStateChanged(PeripheralState),
    Subscribed {
        central: CentralId,
    },
    Unsubscribed {
        central: CentralId,
    },
}

pub type LinkEventSender = mpsc::UnboundedSender<LinkEvent>;
pub type LinkEventReceiver = mpsc::UnboundedReceiver<LinkEvent>;

/// Forwards every callback into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelDelegate {
    sender: LinkEventSender,
}

impl ChannelDelegate {
    pub fn new(sender: LinkEventSender) -> Self {
        Self { sender }
    }

    /// Create a delegate together with the receiving end of its stream
    pub fn channel() -> (Self, LinkEventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    fn emit(&self, event: LinkEvent) {
        if self.sender.send(event).is_err() {
            trace!("Link event receiver dropped; event discarded");
        }
    }
}

impl LinkDelegate for ChannelDelegate {
    fn on_device_discovered(&mut self, device: &DiscoveredDevice, signal_strength: Option<i16>) {
        self.emit(LinkEvent::DeviceDiscovered {
            device: device.clone(),
            signal_strength,
        });
    }

    fn on_connection_established(&mut self, peripheral: &DeviceId) {
        self.emit(LinkEvent::ConnectionEstablished {
            peripheral: peripheral.clone(),
        });
    }

    fn on_data_received(&mut self, payload: &[u8]) {
        self.emit(LinkEvent::DataReceived {
            payload: payload.to_vec(),
        });
    }

    fn on_disconnected(&mut self, peripheral: &DeviceId) {
        self.emit(LinkEvent::Disconnected {
            peripheral: peripheral.clone(),
        });
    }

    fn on_error(&mut self, error: &LinkError) {
        self.emit(LinkEvent::Error(error.clone()));
    }

    fn on_signal_strength(&mut self, peripheral: &DeviceId, rssi: i16) {
        self.emit(LinkEvent::SignalStrength {
            peripheral: peripheral.clone(),
            rssi,
        });
    }

    fn on_central_state_changed(&mut self, state: CentralState) {
        self.emit(LinkEvent::CentralStateChanged(state));
    }

    fn on_peripheral_state_changed(&mut self, state: PeripheralState) {
        self.emit(LinkEvent::PeripheralStateChanged(state));
    }

    fn on_subscribed(&mut self, central: &CentralId) {
        self.emit(LinkEvent::Subscribed {
            central: central.clone(),
        });
    }

    fn on_unsubscribed(&mut self, central: &CentralId) {
        self.emit(LinkEvent::Unsubscribed {
            central: central.clone(),
        });
    }
}
