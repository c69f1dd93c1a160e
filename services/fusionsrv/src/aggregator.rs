//! Group and bank aggregation
//!
//! Derived metrics across parallel groups and battery banks. Group sums run
//! over each member's current published reading, so a member whose endpoint
//! was not due this tick still contributes its retained values; the
//! reporting count says how many members were freshly read. Battery power
//! signs go through the one centralized convention in
//! `fusion_model::power`; no aggregation path applies its own sign.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use fusion_model::{
    signed_battery_power, weighted_soc, BankAggregates, DeviceSerial, Field, GroupAggregates,
    PowerFlow, ValidatedReading,
};

use crate::config::GroupConfig;
use crate::error::{FusionError, Result};

/// Signed battery power for one member.
///
/// Vendor payloads disagree on battery power signs, so the magnitude is
/// taken from the power field and the direction from the battery current
/// (charge positive), falling back to the power field's own sign when no
/// current is reported. Both paths end in [`signed_battery_power`].
fn member_battery_power(reading: &ValidatedReading) -> Option<f64> {
    let power = reading.get(Field::BatteryPower)?;
    let direction = reading
        .get(Field::BatteryCurrent)
        .unwrap_or(power);
    let flow = if direction >= 0.0 {
        PowerFlow::Charge
    } else {
        PowerFlow::Discharge
    };
    Some(signed_battery_power(power, flow))
}

/// Bank aggregates for one device: only batteries that answered on the
/// secondary bus participate. Returns `None` when no battery responded;
/// the bank is suppressed, not published as zeros.
pub fn bank_aggregates(reading: &ValidatedReading) -> Option<BankAggregates> {
    if reading.batteries.is_empty() {
        return None;
    }
    Some(BankAggregates {
        battery_count: reading.batteries.len(),
        soc: weighted_soc(&reading.batteries),
        current: reading.batteries.iter().map(|b| b.current).sum(),
        current_capacity: reading.batteries.iter().map(|b| b.current_capacity).sum(),
        max_capacity: reading.batteries.iter().map(|b| b.max_capacity).sum(),
    })
}

/// Aggregates for one parallel group over the members' current readings.
///
/// `fresh` holds the devices that produced an accepted reading this tick;
/// it drives `reporting_members` only. Members with a retained reading
/// still participate in the sums, so a slow-polling endpoint does not make
/// the group totals oscillate. The group battery count is derived from
/// secondary-bus responders and overrides any `battery_count` field the
/// primary source reports.
pub fn group_aggregates(
    group: &GroupConfig,
    readings: &HashMap<DeviceSerial, ValidatedReading>,
    fresh: &HashSet<DeviceSerial>,
) -> Result<GroupAggregates> {
    if group.members.is_empty() {
        return Err(FusionError::ConfigInconsistency(format!(
            "group {} has zero expected members, aggregate suppressed",
            group.id
        )));
    }

    let mut battery_power = 0.0;
    let mut battery_current = 0.0;
    let mut load_power = 0.0;
    let mut batteries = Vec::new();
    let mut reporting = 0usize;

    for member in &group.members {
        let Some(reading) = readings.get(member) else {
            debug!(group = %group.id, member = %member, "group member has no published reading yet");
            continue;
        };
        if fresh.contains(member) {
            reporting += 1;
        }

        if let Some(power) = member_battery_power(reading) {
            battery_power += power;
        }
        if let Some(load) = reading.get(Field::LoadPower) {
            load_power += load;
        }
        battery_current += reading.batteries.iter().map(|b| b.current).sum::<f64>();
        batteries.extend(reading.batteries.iter().cloned());
    }

    Ok(GroupAggregates {
        battery_power,
        battery_current,
        load_power,
        soc: weighted_soc(&batteries),
        battery_count: batteries.len(),
        reporting_members: reporting,
        expected_members: group.members.len(),
    })
}
