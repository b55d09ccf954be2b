//! Peripheral backend for platforms without GATT server support

use gattlink_core::{
    AdapterState, AdvertisementData, AttResult, CentralId, LinkError, LocalService,
    PeripheralAdapter, PeripheralEventSender, RequestId, Result,
};
use tracing::warn;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Fallback Implementation
// ----------------------------------------------------------------------------

/// Peripheral adapter that reports the role as unsupported
///
/// The advertiser sees `Unsupported` as its initial state and stays inert, so
/// callers get the usual not-ready errors instead of a construction failure.
#[derive(Debug, Default)]
pub struct UnsupportedPeripheral {
    /// Held so the owning task's event channel stays open
    _events: Option<PeripheralEventSender>,
}

impl UnsupportedPeripheral {
    pub fn new() -> Self {
        warn!(
            "BLE peripheral role not supported by this build. The local service will not be \
            published or advertised."
        );
        Self::default()
    }

    fn unsupported(operation: &str) -> LinkError {
        LinkError::platform(operation, "peripheral role not supported on this platform")
    }
}

impl PeripheralAdapter for UnsupportedPeripheral {
    fn attach_events(&mut self, sender: PeripheralEventSender) -> Result<()> {
        self._events = Some(sender);
        Ok(())
    }

    fn state(&self) -> AdapterState {
        AdapterState::Unsupported
    }

    fn publish_service(&mut self, _service: &LocalService) -> Result<()> {
        Err(Self::unsupported("publish service"))
    }

    fn start_advertising(&mut self, _advertisement: &AdvertisementData) -> Result<()> {
        Err(Self::unsupported("start advertising"))
    }

    fn stop_advertising(&mut self) -> Result<()> {
        Ok(())
    }

    fn update_value(
        &mut self,
        _characteristic: Uuid,
        _value: &[u8],
        _subscribers: Option<&[CentralId]>,
    ) -> Result<()> {
        Err(Self::unsupported("update value"))
    }

    fn respond(
        &mut self,
        _request: RequestId,
        _result: AttResult,
        _value: Option<&[u8]>,
    ) -> Result<()> {
        Err(Self::unsupported("respond"))
    }
}
