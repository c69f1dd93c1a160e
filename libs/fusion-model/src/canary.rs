//! Canary bounds policy
//!
//! Pure bounds checks applied to raw readings before they enter the
//! accepted state. A value outside its physical envelope marks the field
//! corrupt; corrupt fields are dropped, never coerced. No I/O dependencies.

use std::collections::HashMap;

use crate::fields::Field;

/// Inclusive physical bounds for one field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanaryBounds {
    pub lower: f64,
    pub upper: f64,
}

/// Outcome of a canary check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CanaryVerdict {
    Pass,
    /// Value outside [lower, upper]
    OutOfBounds { lower: f64, upper: f64 },
    /// Not representable at all (NaN / infinite)
    NotFinite,
}

impl CanaryVerdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, CanaryVerdict::Pass)
    }
}

/// Per-field bounds table
#[derive(Debug, Clone)]
pub struct CanaryPolicy {
    bounds: HashMap<Field, CanaryBounds>,
}

impl CanaryPolicy {
    pub fn empty() -> Self {
        Self {
            bounds: HashMap::new(),
        }
    }

    pub fn with_bounds(mut self, field: Field, lower: f64, upper: f64) -> Self {
        self.bounds.insert(field, CanaryBounds { lower, upper });
        self
    }

    /// Check one value. Fields without configured bounds only get the
    /// finiteness check; a non-finite value is corrupt no matter what.
    pub fn check(&self, field: Field, value: f64) -> CanaryVerdict {
        if !value.is_finite() {
            return CanaryVerdict::NotFinite;
        }
        match self.bounds.get(&field) {
            Some(b) if value < b.lower || value > b.upper => CanaryVerdict::OutOfBounds {
                lower: b.lower,
                upper: b.upper,
            },
            _ => CanaryVerdict::Pass,
        }
    }

    pub fn bounds_for(&self, field: Field) -> Option<CanaryBounds> {
        self.bounds.get(&field).copied()
    }
}

impl Default for CanaryPolicy {
    /// Physical envelopes for residential/commercial hybrid inverters.
    ///
    /// Zero grid frequency is a legitimate off-grid condition and must pass;
    /// the lower bound is therefore 0, not the nominal 45 Hz floor.
    fn default() -> Self {
        Self::empty()
            .with_bounds(Field::GridFrequency, 0.0, 70.0)
            .with_bounds(Field::GridVoltage, 0.0, 600.0)
            .with_bounds(Field::BatterySoc, 0.0, 100.0)
            .with_bounds(Field::BatteryVoltage, 0.0, 1000.0)
            .with_bounds(Field::BatteryCurrent, -2000.0, 2000.0)
            .with_bounds(Field::BatteryTemperature, -40.0, 120.0)
            .with_bounds(Field::InverterTemperature, -40.0, 150.0)
            .with_bounds(Field::RadiatorTemperature, -40.0, 150.0)
            .with_bounds(Field::PvPower, 0.0, 200_000.0)
            .with_bounds(Field::LoadPower, -200_000.0, 200_000.0)
            .with_bounds(Field::GridPower, -200_000.0, 200_000.0)
            .with_bounds(Field::BatteryPower, -200_000.0, 200_000.0)
            .with_bounds(Field::PhaseACurrent, -500.0, 500.0)
            .with_bounds(Field::PhaseBCurrent, -500.0, 500.0)
            .with_bounds(Field::PhaseCCurrent, -500.0, 500.0)
            .with_bounds(Field::BatteryCount, 0.0, 64.0)
            .with_bounds(Field::CurrentCapacity, 0.0, 100_000.0)
            .with_bounds(Field::MaxCapacity, 0.0, 100_000.0)
    }
}
