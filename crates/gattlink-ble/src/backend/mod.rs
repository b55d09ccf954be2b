//! Platform backends
//!
//! The central role runs on btleplug when the `btleplug` feature is enabled.
//! btleplug has no GATT server, so the peripheral role falls back to
//! [`UnsupportedPeripheral`] outside of the simulated backend.

pub mod fallback;

#[cfg(feature = "btleplug")]
pub mod native;

pub use fallback::UnsupportedPeripheral;

#[cfg(feature = "btleplug")]
pub use native::BtleplugCentral;
