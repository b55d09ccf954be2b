//! gattlink Core
//!
//! Sans-IO connection-lifecycle state machines for a single BLE
//! service/characteristic pair: the central coordinator (scan, connect,
//! discover, subscribe, write) and the peripheral advertiser (publish,
//! advertise, serve subscribers and write requests). Platform Bluetooth stacks
//! plug in through the [`CentralAdapter`] and [`PeripheralAdapter`] traits;
//! callers observe the lifecycle through a [`LinkDelegate`].

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod adapter;
pub mod central;
pub mod config;
pub mod delegate;
pub mod errors;
pub mod peripheral;
pub mod protocol;
pub mod types;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use adapter::{
    CentralAdapter, CentralEvent, CentralEventReceiver, CentralEventSender, PeripheralAdapter,
    PeripheralEvent, PeripheralEventReceiver, PeripheralEventSender,
};
pub use central::CentralCoordinator;
pub use config::LinkConfig;
pub use delegate::{
    ChannelDelegate, LinkDelegate, LinkEvent, LinkEventReceiver, LinkEventSender, NoopDelegate,
};
pub use errors::{LinkError, Result};
pub use peripheral::{PeripheralAdvertiser, StaticValue, ValueProducer};
pub use protocol::{parse_uuid, DisplayUuid, DEFAULT_CHARACTERISTIC_UUID, DEFAULT_SERVICE_UUID};
pub use types::{
    AdapterState, AdvertisementData, AttResult, AttributePermissions, CentralId, CentralState,
    CharacteristicProperties, ConnectedSession, DeviceId, DiscoveredDevice, LocalCharacteristic,
    LocalService, PeripheralState, ReadRequest, RemoteCharacteristic, RequestId, ServiceHandle,
    WriteMode, WriteRequest,
};
