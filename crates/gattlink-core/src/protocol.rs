//! GATT identity constants and UUID utilities

use std::fmt;

use uuid::Uuid;

use crate::errors::{LinkError, Result};

// ----------------------------------------------------------------------------
// Bluetooth Base UUID
// ----------------------------------------------------------------------------

/// Low 96 bits of the Bluetooth Base UUID `00000000-0000-1000-8000-00805F9B34FB`
const BLUETOOTH_BASE_LOW_BITS: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

const LOW_96_MASK: u128 = (1u128 << 96) - 1;

/// Expand a 16-bit assigned number into a full 128-bit UUID
pub const fn uuid_from_u16(short: u16) -> Uuid {
    uuid_from_u32(short as u32)
}

/// Expand a 32-bit assigned number into a full 128-bit UUID
pub const fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(((short as u128) << 96) | BLUETOOTH_BASE_LOW_BITS)
}

// ----------------------------------------------------------------------------
// Defaults
// ----------------------------------------------------------------------------

/// Default service UUID (`FFE0`, the serial service exposed by HM-10 style modules)
pub const DEFAULT_SERVICE_UUID: Uuid = uuid_from_u16(0xFFE0);

/// Default characteristic UUID (`FFE1`, inside the `FFE0` service)
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid = uuid_from_u16(0xFFE1);

/// Advertisements at or below this strength (dBm) are ignored
pub const DEFAULT_RSSI_THRESHOLD: i16 = -70;

/// Payload pushed to a central when it subscribes
pub const DEFAULT_GREETING: &str = "Hello, World!";

/// Local name used when advertising
pub const DEFAULT_LOCAL_NAME: &str = "gattlink";

// ----------------------------------------------------------------------------
// Parsing and Display
// ----------------------------------------------------------------------------

/// Parse a UUID in 16-bit (`FFE0`), 32-bit (`0000FFE0`) or 128-bit form
pub fn parse_uuid(input: &str) -> Result<Uuid> {
    let trimmed = input.trim();
    let hex_only = trimmed.chars().all(|c| c.is_ascii_hexdigit());

    match trimmed.len() {
        4 if hex_only => u16::from_str_radix(trimmed, 16)
            .map(uuid_from_u16)
            .map_err(|_| LinkError::InvalidUuid(input.to_string())),
        8 if hex_only => u32::from_str_radix(trimmed, 16)
            .map(uuid_from_u32)
            .map_err(|_| LinkError::InvalidUuid(input.to_string())),
        _ => Uuid::parse_str(trimmed).map_err(|_| LinkError::InvalidUuid(input.to_string())),
    }
}

/// Return the assigned number if `uuid` lies on the Bluetooth base
pub fn short_form(uuid: &Uuid) -> Option<u32> {
    let value = uuid.as_u128();
    if value & LOW_96_MASK == BLUETOOTH_BASE_LOW_BITS {
        Some((value >> 96) as u32)
    } else {
        None
    }
}

/// Displays a UUID the way Bluetooth tooling usually does: `FFE0` for
/// assigned numbers, the hyphenated form otherwise.
#[derive(Debug, Clone, Copy)]
pub struct DisplayUuid<'a>(pub &'a Uuid);

impl fmt::Display for DisplayUuid<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match short_form(self.0) {
            Some(short) if short <= 0xFFFF => write!(f, "{:04X}", short),
            Some(short) => write!(f, "{:08X}", short),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Serde adapter that writes UUIDs in short form when possible and accepts
/// every form [`parse_uuid`] understands.
pub mod serde_uuid {
    use serde::{Deserialize, Deserializer, Serializer};
    use uuid::Uuid;

    use super::{parse_uuid, DisplayUuid};

    pub fn serialize<S: Serializer>(uuid: &Uuid, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&DisplayUuid(uuid))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_uuid(&raw).map_err(serde::de::Error::custom)
    }
}
