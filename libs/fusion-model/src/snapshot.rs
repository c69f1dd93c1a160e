//! Published snapshot value types
//!
//! The snapshot is the single read surface for downstream consumers. It is
//! immutable once built; the store swaps whole snapshots atomically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::reading::ValidatedReading;
use crate::types::{DeviceSerial, SmartPortState};

/// Per-endpoint poll health counters, published for diagnostics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
}

/// Aggregates for one battery bank (all batteries of one device)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankAggregates {
    /// Batteries actually answering on the secondary bus
    pub battery_count: usize,
    /// Capacity-weighted state of charge, percent
    pub soc: Option<f64>,
    /// Summed signed current, amps (charge positive)
    pub current: f64,
    /// Summed remaining capacity, Ah
    pub current_capacity: f64,
    /// Summed design capacity, Ah
    pub max_capacity: f64,
}

/// Aggregates for one parallel group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAggregates {
    /// Summed signed battery power, watts (charge positive)
    pub battery_power: f64,
    /// Summed signed battery current, amps
    pub battery_current: f64,
    /// Summed load power, watts
    pub load_power: f64,
    /// Capacity-weighted state of charge across all member banks
    pub soc: Option<f64>,
    /// Batteries responding across the group; overrides any zero or stale
    /// count from the primary source
    pub battery_count: usize,
    /// Members that contributed a current-tick reading
    pub reporting_members: usize,
    /// Configured member count
    pub expected_members: usize,
}

/// Everything published for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    pub reading: ValidatedReading,
    /// Stale-but-labeled: consumers must mark the entity unavailable, data
    /// stays visible
    pub degraded: bool,
    pub bank: Option<BankAggregates>,
    /// Decoded smart load ports, for grid-interconnect devices
    pub smart_ports: Vec<SmartPortState>,
}

/// Atomically published engine state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Strictly increasing publish counter
    pub version: u64,
    pub captured_at: DateTime<Utc>,
    pub devices: HashMap<DeviceSerial, DeviceState>,
    /// Group id → aggregates; absent when suppressed by config inconsistency
    pub groups: HashMap<String, GroupAggregates>,
    /// Endpoint display key ("kind@endpoint") → health counters
    pub endpoints: HashMap<String, EndpointHealth>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            captured_at: Utc::now(),
            devices: HashMap::new(),
            groups: HashMap::new(),
            endpoints: HashMap::new(),
        }
    }

    pub fn device(&self, serial: &DeviceSerial) -> Option<&DeviceState> {
        self.devices.get(serial)
    }
}
