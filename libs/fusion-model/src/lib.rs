//! Fusion Model Library
//!
//! Core data model for the solar fleet fusion engine.
//! This library provides pure types and calculation logic without I/O
//! or service dependencies.
//!
//! # Modules
//!
//! - `fields`: Canonical field table and vendor alias mapping
//! - `types`: Device, transport and endpoint identities
//! - `reading`: Raw and validated reading types
//! - `canary`: Bounds policy for rejecting corrupted transport reads
//! - `power`: Centralized sign convention and weighted state-of-charge
//! - `snapshot`: Published snapshot value types

pub mod canary;
pub mod fields;
pub mod power;
pub mod reading;
pub mod snapshot;
pub mod types;

// Re-exports for convenience
pub use canary::{CanaryPolicy, CanaryVerdict};
pub use fields::{Field, LOCAL_OVERLAY_FIELDS};
pub use power::{signed_battery_power, weighted_soc, PowerFlow};
pub use reading::{AcceptedReading, BatteryReading, FieldSample, RawReading, ValidatedReading};
pub use snapshot::{BankAggregates, DeviceState, EndpointHealth, GroupAggregates, Snapshot};
pub use types::{
    DeviceSerial, DeviceSpec, EndpointKey, PhaseType, SmartPortState, TransportKind,
};
