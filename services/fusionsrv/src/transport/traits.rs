//! Transport client interface
//!
//! The engine does not own wire protocols; it orchestrates an external
//! transport layer exposing read/write primitives and typed errors. This
//! module defines that seam. Payload field keys are vendor-vocabulary
//! strings; translation to canonical [`fusion_model::Field`]s happens in the
//! readers.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use fusion_model::{BatteryReading, DeviceSerial, DeviceSpec, Field, TransportKind};

/// Transport layer error types
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Read or write exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Session is no longer valid; the external layer must re-authenticate
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// One register range failed to read
    #[error("Range read failed ({range}): {reason}")]
    RangeRead { range: String, reason: String },

    /// Underlying I/O failure
    #[error("IO error: {0}")]
    Io(String),

    /// Operation not supported by this transport kind
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Register ranges read per device on local transports.
///
/// Each range is read independently; a failure on one leaves the others
/// untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadRange {
    /// Power, energy counters, grid quality
    Realtime,
    /// Per-phase currents and temperatures
    Phases,
    /// Secondary-bus battery data
    BatteryBank,
    /// Firmware identifier, rated power; cached beyond the poll TTL
    StaticInfo,
}

impl ReadRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadRange::Realtime => "realtime",
            ReadRange::Phases => "phases",
            ReadRange::BatteryBank => "battery_bank",
            ReadRange::StaticInfo => "static_info",
        }
    }

    /// Static ranges are re-read only when the cache is empty or invalidated
    pub fn is_static(&self) -> bool {
        matches!(self, ReadRange::StaticInfo)
    }

    /// Ranges polled for a local device each cycle, in read order
    pub fn local_poll_set(has_battery: bool) -> Vec<ReadRange> {
        let mut ranges = vec![ReadRange::Realtime, ReadRange::Phases];
        if has_battery {
            ranges.push(ReadRange::BatteryBank);
        }
        ranges.push(ReadRange::StaticInfo);
        ranges
    }
}

impl fmt::Display for ReadRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw fields for one device as returned by a transport read
#[derive(Debug, Clone, Default)]
pub struct RangePayload {
    /// Vendor field key → value
    pub fields: HashMap<String, f64>,
    /// Batteries answering on the secondary bus, when the range covers them
    pub batteries: Vec<BatteryReading>,
}

impl RangePayload {
    pub fn with_field(mut self, key: &str, value: f64) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

/// External transport client seam
#[async_trait]
pub trait TransportClient: Send + Sync + fmt::Debug {
    /// Transport kind served by this client
    fn kind(&self) -> TransportKind;

    /// Ranges to poll for one device, in read order. Clients for devices
    /// with a non-standard register map may narrow or reorder this.
    fn describe_ranges(&self, device: &DeviceSpec) -> Vec<ReadRange> {
        ReadRange::local_poll_set(device.has_battery)
    }

    /// Read one register range for one device (local transports)
    async fn read_range(
        &self,
        device: &DeviceSerial,
        range: ReadRange,
    ) -> std::result::Result<RangePayload, TransportError> {
        let _ = (device, range);
        Err(TransportError::Unsupported(format!(
            "{} does not expose range reads",
            self.kind()
        )))
    }

    /// Read all listed devices in one batched request (cloud transport)
    async fn read_batch(
        &self,
        devices: &[DeviceSerial],
    ) -> std::result::Result<HashMap<DeviceSerial, RangePayload>, TransportError> {
        let _ = devices;
        Err(TransportError::Unsupported(format!(
            "{} does not expose batched reads",
            self.kind()
        )))
    }

    /// Write one parameter through the external write primitive
    async fn write_param(
        &self,
        device: &DeviceSerial,
        field: Field,
        value: f64,
    ) -> std::result::Result<(), TransportError>;
}
