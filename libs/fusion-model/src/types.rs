//! Core domain types for the fusion engine
//!
//! Device and transport identities plus the endpoint gating key. The gating
//! key is deliberately a dedicated type: the source system keyed poll
//! timestamps ad hoc per device and starved devices sharing a physical link,
//! so everything interval-related is forced through [`EndpointKey`].

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Transport identity
// ============================================================================

/// Transport kinds the engine can poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Vendor cloud telemetry API, batched per poll cycle
    #[serde(rename = "cloud")]
    Cloud,
    /// Modbus over TCP
    #[serde(rename = "modbus-tcp", alias = "modbus_tcp")]
    ModbusTcp,
    /// Vendor TCP "dongle" protocol
    #[serde(rename = "dongle")]
    Dongle,
    /// RS-485 serial bus
    #[serde(rename = "serial")]
    Serial,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Cloud => "cloud",
            TransportKind::ModbusTcp => "modbus-tcp",
            TransportKind::Dongle => "dongle",
            TransportKind::Serial => "serial",
        }
    }

    /// Local hardware links, as opposed to the cloud API
    pub fn is_local(&self) -> bool {
        !matches!(self, TransportKind::Cloud)
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gating key for poll scheduling: one physical link, one key.
///
/// Interval gating timestamps, failure counters and the one-in-flight-read
/// rule are all keyed by this pair, never per device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    pub kind: TransportKind,
    /// Endpoint identity: host:port for TCP links, tty path for serial,
    /// account id for cloud
    pub endpoint: String,
}

impl EndpointKey {
    pub fn new(kind: TransportKind, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
        }
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.kind, self.endpoint)
    }
}

// ============================================================================
// Device identity
// ============================================================================

/// Stable device serial number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceSerial(pub String);

impl DeviceSerial {
    pub fn new(serial: impl Into<String>) -> Self {
        Self(serial.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceSerial {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Phase configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseType {
    #[serde(rename = "single")]
    SinglePhase,
    #[serde(rename = "three")]
    ThreePhase,
}

/// Device description from configuration, feature flags refined by discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub serial: DeviceSerial,
    /// Family/model tag, e.g. "hybrid-12k" or "mid-8k"
    pub model: String,
    pub phase: PhaseType,
    /// Number of smart load ports (grid-interconnect devices)
    #[serde(default)]
    pub smart_ports: u8,
    /// Battery presence; false for grid-interconnect devices
    #[serde(default)]
    pub has_battery: bool,
    /// Transport kinds assigned to this device
    pub transports: Vec<TransportKind>,
}

impl DeviceSpec {
    /// Hybrid mode: cloud and at least one local transport attached
    pub fn is_hybrid(&self) -> bool {
        self.transports.contains(&TransportKind::Cloud)
            && self.transports.iter().any(|t| t.is_local())
    }
}

// ============================================================================
// Smart ports
// ============================================================================

/// Decoded state of one smart load port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartPortState {
    Disabled,
    LoadOutput,
    AcCouple,
    Generator,
}

impl SmartPortState {
    /// Decode the bit-packed status register: two bits per port, port 0 in
    /// the lowest bits.
    pub fn decode(raw: u16, port_count: u8) -> Vec<SmartPortState> {
        (0..port_count.min(8))
            .map(|port| match (raw >> (port * 2)) & 0b11 {
                0b00 => SmartPortState::Disabled,
                0b01 => SmartPortState::LoadOutput,
                0b10 => SmartPortState::AcCouple,
                _ => SmartPortState::Generator,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_key_display() {
        let key = EndpointKey::new(TransportKind::ModbusTcp, "192.168.1.10:502");
        assert_eq!(key.to_string(), "modbus-tcp@192.168.1.10:502");
    }

    #[test]
    fn endpoint_keys_distinguish_links_not_devices() {
        // Two devices on one dongle share a key; same host via a different
        // transport kind does not.
        let a = EndpointKey::new(TransportKind::Dongle, "10.0.0.5:8899");
        let b = EndpointKey::new(TransportKind::Dongle, "10.0.0.5:8899");
        let c = EndpointKey::new(TransportKind::ModbusTcp, "10.0.0.5:8899");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn hybrid_detection() {
        let spec = DeviceSpec {
            serial: DeviceSerial::new("INV-001"),
            model: "hybrid-12k".to_string(),
            phase: PhaseType::ThreePhase,
            smart_ports: 0,
            has_battery: true,
            transports: vec![TransportKind::Cloud, TransportKind::ModbusTcp],
        };
        assert!(spec.is_hybrid());

        let local_only = DeviceSpec {
            transports: vec![TransportKind::Serial],
            ..spec.clone()
        };
        assert!(!local_only.is_hybrid());
    }

    #[test]
    fn smart_port_decode() {
        // port0=load(01), port1=ac-couple(10), port2=disabled(00)
        let ports = SmartPortState::decode(0b00_10_01, 3);
        assert_eq!(
            ports,
            vec![
                SmartPortState::LoadOutput,
                SmartPortState::AcCouple,
                SmartPortState::Disabled
            ]
        );
    }

    #[test]
    fn smart_port_decode_respects_port_count() {
        assert_eq!(SmartPortState::decode(0xFFFF, 2).len(), 2);
        assert!(SmartPortState::decode(0xFFFF, 0).is_empty());
    }
}
