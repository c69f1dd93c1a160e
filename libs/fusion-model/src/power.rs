//! Power sign convention and battery aggregation math
//!
//! The battery power sign convention lives here and only here. The source
//! system carried two inverted conventions across polling modes and patched
//! the mismatch ad hoc; every aggregation path in this engine calls
//! [`signed_battery_power`] instead of applying its own sign.

use crate::reading::BatteryReading;

/// Direction of battery power flow as reported by a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerFlow {
    Charge,
    Discharge,
}

/// Apply the engine-wide sign convention: charge positive, discharge
/// negative. `magnitude` is the unsigned value from the transport.
pub fn signed_battery_power(magnitude: f64, flow: PowerFlow) -> f64 {
    let magnitude = magnitude.abs();
    match flow {
        PowerFlow::Charge => magnitude,
        PowerFlow::Discharge => -magnitude,
    }
}

/// Capacity-weighted state of charge over bank members:
/// `(Σ current_capacity / Σ max_capacity) × 100`.
///
/// A simple mean of member SOCs would be wrong for unequal capacities.
/// Returns `None` when no member reports a usable max capacity.
pub fn weighted_soc(members: &[BatteryReading]) -> Option<f64> {
    let total_max: f64 = members.iter().map(|b| b.max_capacity).sum();
    if total_max <= 0.0 {
        return None;
    }
    let total_current: f64 = members.iter().map(|b| b.current_capacity).sum();
    Some(total_current / total_max * 100.0)
}
