//! Tokio runtime for the gattlink BLE coordination core
//!
//! The core state machines are synchronous and own no I/O. This crate gives
//! each role its own task:
//!
//! - [`CentralTask`] drives a [`CentralCoordinator`] and arms the discovery
//!   stall timer
//! - [`PeripheralTask`] drives a [`PeripheralAdvertiser`]
//!
//! Both are controlled through cloneable handles and report to a
//! [`LinkDelegate`](gattlink_core::LinkDelegate).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gattlink_ble::CentralTask;
//! use gattlink_core::{ChannelDelegate, LinkConfig, LinkEvent};
//! # use gattlink_core::CentralAdapter;
//!
//! # async fn example(adapter: impl CentralAdapter + 'static) -> gattlink_core::Result<()> {
//! let (delegate, mut events) = ChannelDelegate::channel();
//! let (task, handle) = CentralTask::new(LinkConfig::default(), adapter, Box::new(delegate))?;
//! task.spawn();
//!
//! handle.start_scan().await?;
//! while let Some(event) = events.recv().await {
//!     if let LinkEvent::DeviceDiscovered { device, .. } = event {
//!         handle.connect(device.id).await?;
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`CentralCoordinator`]: gattlink_core::CentralCoordinator
//! [`PeripheralAdvertiser`]: gattlink_core::PeripheralAdvertiser

pub mod backend;
pub mod central;
pub mod error;
pub mod peripheral;
pub mod task;

pub use central::{CentralHandle, CentralSnapshot, CentralTask};
pub use error::BackendError;
pub use peripheral::{PeripheralHandle, PeripheralSnapshot, PeripheralTask};
pub use task::{Role, RoleTask};

pub use backend::UnsupportedPeripheral;

#[cfg(feature = "btleplug")]
pub use backend::BtleplugCentral;

#[cfg(feature = "sim")]
pub use gattlink_core::sim;
