//! Canonical Field Table
//!
//! Every value the engine handles is keyed by a [`Field`] variant. Vendor
//! payloads (cloud JSON keys, local register-map names) are translated
//! through a fixed alias table at the reader boundary, so field identity is
//! checked at compile time everywhere else. A test asserts the alias table
//! reaches every canonical field, preventing silent drift when either side
//! gains a field.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical device fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    // Instantaneous power
    PvPower,
    LoadPower,
    GridPower,
    BatteryPower,

    // Battery electricals
    BatteryCurrent,
    BatteryVoltage,
    BatterySoc,
    BatteryTemperature,
    BatteryCount,
    CurrentCapacity,
    MaxCapacity,

    // Grid quality
    GridFrequency,
    GridVoltage,

    // Per-phase currents
    PhaseACurrent,
    PhaseBCurrent,
    PhaseCCurrent,

    // Temperature probes
    InverterTemperature,
    RadiatorTemperature,

    // Lifetime energy counters (monotonic by physics)
    LifetimePvEnergy,
    LifetimeLoadEnergy,
    LifetimeGridImportEnergy,
    LifetimeGridExportEnergy,
    LifetimeBatteryChargeEnergy,
    LifetimeBatteryDischargeEnergy,

    // Static / rarely changing
    FirmwareCode,
    RatedPower,

    // Bit-packed smart-port status register
    SmartPortStatus,
}

impl Field {
    /// Canonical string key, used in logs and serialized snapshots
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::PvPower => "pv_power",
            Field::LoadPower => "load_power",
            Field::GridPower => "grid_power",
            Field::BatteryPower => "battery_power",
            Field::BatteryCurrent => "battery_current",
            Field::BatteryVoltage => "battery_voltage",
            Field::BatterySoc => "battery_soc",
            Field::BatteryTemperature => "battery_temperature",
            Field::BatteryCount => "battery_count",
            Field::CurrentCapacity => "current_capacity",
            Field::MaxCapacity => "max_capacity",
            Field::GridFrequency => "grid_frequency",
            Field::GridVoltage => "grid_voltage",
            Field::PhaseACurrent => "phase_a_current",
            Field::PhaseBCurrent => "phase_b_current",
            Field::PhaseCCurrent => "phase_c_current",
            Field::InverterTemperature => "inverter_temperature",
            Field::RadiatorTemperature => "radiator_temperature",
            Field::LifetimePvEnergy => "lifetime_pv_energy",
            Field::LifetimeLoadEnergy => "lifetime_load_energy",
            Field::LifetimeGridImportEnergy => "lifetime_grid_import_energy",
            Field::LifetimeGridExportEnergy => "lifetime_grid_export_energy",
            Field::LifetimeBatteryChargeEnergy => "lifetime_battery_charge_energy",
            Field::LifetimeBatteryDischargeEnergy => "lifetime_battery_discharge_energy",
            Field::FirmwareCode => "firmware_code",
            Field::RatedPower => "rated_power",
            Field::SmartPortStatus => "smart_port_status",
        }
    }

    /// Lifetime energy counters are monotonic by physics; the validator
    /// rejects any decrease unconditionally.
    pub fn is_lifetime(&self) -> bool {
        matches!(
            self,
            Field::LifetimePvEnergy
                | Field::LifetimeLoadEnergy
                | Field::LifetimeGridImportEnergy
                | Field::LifetimeGridExportEnergy
                | Field::LifetimeBatteryChargeEnergy
                | Field::LifetimeBatteryDischargeEnergy
        )
    }

    /// Static fields change only on firmware/hardware swaps and are cached
    /// beyond the normal poll TTL.
    pub fn is_static(&self) -> bool {
        matches!(self, Field::FirmwareCode | Field::RatedPower)
    }

    /// Translate a vendor payload key to its canonical field.
    ///
    /// Covers both the cloud API vocabulary and the local register-map
    /// vocabulary. Canonical keys always map to themselves.
    pub fn from_vendor_key(key: &str) -> Option<Field> {
        VENDOR_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, field)| *field)
    }

    /// All canonical fields, for table-completeness tests
    pub fn all() -> &'static [Field] {
        ALL_FIELDS
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const ALL_FIELDS: &[Field] = &[
    Field::PvPower,
    Field::LoadPower,
    Field::GridPower,
    Field::BatteryPower,
    Field::BatteryCurrent,
    Field::BatteryVoltage,
    Field::BatterySoc,
    Field::BatteryTemperature,
    Field::BatteryCount,
    Field::CurrentCapacity,
    Field::MaxCapacity,
    Field::GridFrequency,
    Field::GridVoltage,
    Field::PhaseACurrent,
    Field::PhaseBCurrent,
    Field::PhaseCCurrent,
    Field::InverterTemperature,
    Field::RadiatorTemperature,
    Field::LifetimePvEnergy,
    Field::LifetimeLoadEnergy,
    Field::LifetimeGridImportEnergy,
    Field::LifetimeGridExportEnergy,
    Field::LifetimeBatteryChargeEnergy,
    Field::LifetimeBatteryDischargeEnergy,
    Field::FirmwareCode,
    Field::RatedPower,
    Field::SmartPortStatus,
];

/// Vendor key → canonical field. First column: alias as it appears in the
/// transport payload (cloud JSON key or local register-map name).
const VENDOR_ALIASES: &[(&str, Field)] = &[
    // Cloud API vocabulary
    ("ppv", Field::PvPower),
    ("pLoad", Field::LoadPower),
    ("pGrid", Field::GridPower),
    ("pBattery", Field::BatteryPower),
    ("iBattery", Field::BatteryCurrent),
    ("vBattery", Field::BatteryVoltage),
    ("soc", Field::BatterySoc),
    ("tBattery", Field::BatteryTemperature),
    ("batCount", Field::BatteryCount),
    ("capRemain", Field::CurrentCapacity),
    ("capTotal", Field::MaxCapacity),
    ("fac", Field::GridFrequency),
    ("vac", Field::GridVoltage),
    ("iacL1", Field::PhaseACurrent),
    ("iacL2", Field::PhaseBCurrent),
    ("iacL3", Field::PhaseCCurrent),
    ("tInv", Field::InverterTemperature),
    ("tRad", Field::RadiatorTemperature),
    ("ePvTotal", Field::LifetimePvEnergy),
    ("eLoadTotal", Field::LifetimeLoadEnergy),
    ("eGridInTotal", Field::LifetimeGridImportEnergy),
    ("eGridOutTotal", Field::LifetimeGridExportEnergy),
    ("eChargeTotal", Field::LifetimeBatteryChargeEnergy),
    ("eDischargeTotal", Field::LifetimeBatteryDischargeEnergy),
    ("fwCode", Field::FirmwareCode),
    ("ratedPower", Field::RatedPower),
    ("portStatus", Field::SmartPortStatus),
    // Local register-map vocabulary
    ("reg_pv_power", Field::PvPower),
    ("reg_load_power", Field::LoadPower),
    ("reg_grid_power", Field::GridPower),
    ("reg_bat_power", Field::BatteryPower),
    ("reg_bat_current", Field::BatteryCurrent),
    ("reg_bat_voltage", Field::BatteryVoltage),
    ("reg_bat_soc", Field::BatterySoc),
    ("reg_bat_temp", Field::BatteryTemperature),
    ("reg_bat_count", Field::BatteryCount),
    ("reg_cap_remain", Field::CurrentCapacity),
    ("reg_cap_total", Field::MaxCapacity),
    ("reg_grid_freq", Field::GridFrequency),
    ("reg_grid_voltage", Field::GridVoltage),
    ("reg_phase_a_current", Field::PhaseACurrent),
    ("reg_phase_b_current", Field::PhaseBCurrent),
    ("reg_phase_c_current", Field::PhaseCCurrent),
    ("reg_inv_temp", Field::InverterTemperature),
    ("reg_rad_temp", Field::RadiatorTemperature),
    ("reg_e_pv_total", Field::LifetimePvEnergy),
    ("reg_e_load_total", Field::LifetimeLoadEnergy),
    ("reg_e_grid_in_total", Field::LifetimeGridImportEnergy),
    ("reg_e_grid_out_total", Field::LifetimeGridExportEnergy),
    ("reg_e_charge_total", Field::LifetimeBatteryChargeEnergy),
    ("reg_e_discharge_total", Field::LifetimeBatteryDischargeEnergy),
    ("reg_fw_code", Field::FirmwareCode),
    ("reg_rated_power", Field::RatedPower),
    ("reg_port_status", Field::SmartPortStatus),
];

/// Fields sourced exclusively from local reads in hybrid mode.
///
/// Local hardware links see these with better resolution and latency than
/// the cloud round trip; when a valid local reading exists this cycle it
/// replaces the cloud value, everything else keeps the cloud baseline.
pub const LOCAL_OVERLAY_FIELDS: &[Field] = &[
    Field::InverterTemperature,
    Field::RadiatorTemperature,
    Field::BatteryTemperature,
    Field::PhaseACurrent,
    Field::PhaseBCurrent,
    Field::PhaseCCurrent,
    Field::LoadPower,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn alias_table_covers_every_canonical_field() {
        let reachable: HashSet<Field> = VENDOR_ALIASES.iter().map(|(_, f)| *f).collect();
        for field in Field::all() {
            assert!(
                reachable.contains(field),
                "field {} has no vendor alias",
                field
            );
        }
    }

    #[test]
    fn both_vendor_vocabularies_are_complete() {
        let cloud: HashSet<Field> = VENDOR_ALIASES
            .iter()
            .filter(|(alias, _)| !alias.starts_with("reg_"))
            .map(|(_, f)| *f)
            .collect();
        let local: HashSet<Field> = VENDOR_ALIASES
            .iter()
            .filter(|(alias, _)| alias.starts_with("reg_"))
            .map(|(_, f)| *f)
            .collect();
        for field in Field::all() {
            assert!(cloud.contains(field), "no cloud alias for {}", field);
            assert!(local.contains(field), "no local alias for {}", field);
        }
    }

    #[test]
    fn vendor_key_lookup() {
        assert_eq!(Field::from_vendor_key("fac"), Some(Field::GridFrequency));
        assert_eq!(
            Field::from_vendor_key("reg_grid_freq"),
            Some(Field::GridFrequency)
        );
        assert_eq!(Field::from_vendor_key("no_such_key"), None);
    }

    #[test]
    fn overlay_whitelist_is_local_only_telemetry() {
        for field in LOCAL_OVERLAY_FIELDS {
            assert!(!field.is_lifetime(), "{} must not be overlaid", field);
            assert!(!field.is_static(), "{} must not be overlaid", field);
        }
    }

    #[test]
    fn lifetime_classification() {
        assert!(Field::LifetimePvEnergy.is_lifetime());
        assert!(Field::LifetimeBatteryDischargeEnergy.is_lifetime());
        assert!(!Field::PvPower.is_lifetime());
        assert!(!Field::BatterySoc.is_lifetime());
    }
}
