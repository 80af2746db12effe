//! Record types shared by backends, the reconciler and the engine
//!
//! Backends normalize their wire formats into [`RegistryIpRecord`] and
//! [`PollerDevice`]; the reconciler only ever sees these types. Write payloads
//! ([`CreateEntry`], [`PatchEntry`]) are built here as well so every backend
//! submits the same shapes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Largest magnitude at which every integer is exactly representable in an f64
const MAX_EXACT_F64_INT: f64 = 9_007_199_254_740_992.0;

/// Registry-assigned identifier of an IP address record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistryId(pub u64);

impl fmt::Display for RegistryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Poller-assigned device identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub i64);

impl DeviceId {
    /// Decode a device identifier from a raw JSON value
    ///
    /// Accepts integers, integral floats (`5.0`) and integral numeric strings
    /// (`"5"`). `null` means the row has no device identity. Anything that is
    /// not exactly an integer is a [`Error::DataShape`]; values are never
    /// rounded or truncated.
    pub fn from_json(value: &Value) -> Result<Option<Self>> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Some(Self(i)));
                }
                if n.is_u64() {
                    return Err(Error::data_shape(format!(
                        "device_id {} exceeds the signed 64-bit range",
                        n
                    )));
                }
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() <= MAX_EXACT_F64_INT => {
                        Ok(Some(Self(f as i64)))
                    }
                    _ => Err(Error::data_shape(format!(
                        "device_id {} is not an exact integer",
                        n
                    ))),
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| Some(Self(i)))
                .map_err(|_| {
                    Error::data_shape(format!("device_id {:?} is not an integer", s))
                }),
            other => Err(Error::data_shape(format!(
                "device_id has unsupported type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One address entry in the Registry
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryIpRecord {
    /// Registry identifier (required for updates)
    pub id: RegistryId,
    /// Address without prefix
    pub ip: String,
    /// Prefix length, if the address carried one
    pub mask: Option<String>,
    /// Flattened custom fields
    pub extensions: BTreeMap<String, Value>,
}

impl RegistryIpRecord {
    /// Create a record from a combined `ip/mask` address string
    pub fn from_address(id: RegistryId, address: &str) -> Self {
        let (ip, mask) = split_address(address);
        Self {
            id,
            ip,
            mask,
            extensions: BTreeMap::new(),
        }
    }

    /// Attach flattened extension fields
    pub fn with_extensions(mut self, extensions: BTreeMap<String, Value>) -> Self {
        self.extensions = extensions;
        self
    }
}

/// Split a Registry `address` (`10.0.0.1/32`) into ip and mask
///
/// Only the first `/` separates the two parts. An address with no `/` has no
/// mask.
pub fn split_address(address: &str) -> (String, Option<String>) {
    match address.split_once('/') {
        Some((ip, mask)) => (ip.to_string(), Some(mask.to_string())),
        None => (address.to_string(), None),
    }
}

/// One device as reported by the Poller
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PollerDevice {
    /// Join key. Devices added by hostname may have none.
    pub ip: Option<String>,
    pub device_id: Option<DeviceId>,
    pub sys_name: Value,
    pub sys_descr: Value,
    pub hardware: Value,
    pub os: Value,
    pub last_polled: Value,
    pub serial: Value,
}

impl PollerDevice {
    /// Create a device with an address and identifier, other fields null
    pub fn new(ip: impl Into<String>, device_id: i64) -> Self {
        Self {
            ip: Some(ip.into()),
            device_id: Some(DeviceId(device_id)),
            ..Self::default()
        }
    }

    /// The address usable as a join key, if any
    ///
    /// Empty strings count as absent.
    pub fn address(&self) -> Option<&str> {
        self.ip.as_deref().filter(|ip| !ip.is_empty())
    }
}

/// Status written on every record this system creates or patches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressStatus {
    Active,
}

/// Entry of a bulk create request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateEntry {
    pub address: String,
    pub status: AddressStatus,
}

impl CreateEntry {
    /// Single-host entry for a discovered address
    pub fn host_route(ip: &str) -> Self {
        Self {
            address: format!("{}/32", ip),
            status: AddressStatus::Active,
        }
    }
}

/// Polling metadata mirrored into the Registry's custom fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollingMetadata {
    pub device_id: String,
    #[serde(rename = "sysName")]
    pub sys_name: String,
    #[serde(rename = "sysDescr")]
    pub sys_descr: String,
    pub hardware: String,
    pub os: String,
    pub last_polled: String,
    pub serial: String,
}

impl PollingMetadata {
    /// Coerce a device's metadata to text
    pub fn from_device(device_id: DeviceId, device: &PollerDevice) -> Self {
        Self {
            device_id: device_id.to_string(),
            sys_name: metadata_text(&device.sys_name),
            sys_descr: metadata_text(&device.sys_descr),
            hardware: metadata_text(&device.hardware),
            os: metadata_text(&device.os),
            last_polled: metadata_text(&device.last_polled),
            serial: metadata_text(&device.serial),
        }
    }
}

/// Entry of a bulk update request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchEntry {
    pub id: RegistryId,
    pub status: AddressStatus,
    pub custom_fields: PollingMetadata,
}

/// Text form of a metadata value: strings verbatim, null as empty
pub fn metadata_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Acknowledgement of a bulk write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    /// Number of entries carried by the request
    pub submitted: usize,
    /// True when the payload was logged instead of sent
    pub dry_run: bool,
}
