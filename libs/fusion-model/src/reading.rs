//! Raw and validated reading types
//!
//! A [`RawReading`] is what one transport produced for one device in one
//! poll: ephemeral, unvalidated, tagged with provenance. A
//! [`ValidatedReading`] is the accepted per-device state the snapshot
//! publishes: every field carries the provenance and capture time of the
//! poll that produced it, so stale-good retention keeps the original
//! timestamp visible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::fields::Field;
use crate::types::TransportKind;

/// One battery reporting on the secondary bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryReading {
    /// Position on the battery bus
    pub index: u8,
    /// State of charge, percent
    pub soc: f64,
    /// Signed current, amps (charge positive)
    pub current: f64,
    /// Remaining capacity, Ah
    pub current_capacity: f64,
    /// Design capacity, Ah
    pub max_capacity: f64,
}

/// Unvalidated per-device output of one poll
#[derive(Debug, Clone)]
pub struct RawReading {
    pub fields: HashMap<Field, f64>,
    /// Secondary-bus battery data: `None` when the bank was not read this
    /// poll, `Some` with the batteries that answered. A battery that did
    /// not answer is simply absent, never a zero-valued entry.
    pub batteries: Option<Vec<BatteryReading>>,
    pub captured_at: DateTime<Utc>,
    pub provenance: TransportKind,
}

impl RawReading {
    pub fn new(provenance: TransportKind) -> Self {
        Self {
            fields: HashMap::new(),
            batteries: None,
            captured_at: Utc::now(),
            provenance,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.batteries.is_none()
    }
}

/// One accepted field value with its origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldSample {
    pub value: f64,
    pub source: TransportKind,
    pub captured_at: DateTime<Utc>,
}

/// Fields accepted from one transport in one tick. Unlike
/// [`ValidatedReading`] this holds only current-tick data; the merge step
/// combines it with the prior state for stale-good retention.
#[derive(Debug, Clone, Default)]
pub struct AcceptedReading {
    pub fields: HashMap<Field, FieldSample>,
    /// `None` when the battery bank was not read this tick
    pub batteries: Option<Vec<BatteryReading>>,
}

impl AcceptedReading {
    pub fn get(&self, field: Field) -> Option<f64> {
        self.fields.get(&field).map(|s| s.value)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.batteries.is_none()
    }
}

/// Accepted per-device state, published in snapshots.
///
/// On rejection or partial failure the previous sample is retained, so a
/// consumer always sees the last good value with its real capture time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidatedReading {
    pub fields: HashMap<Field, FieldSample>,
    pub batteries: Vec<BatteryReading>,
}

impl ValidatedReading {
    pub fn get(&self, field: Field) -> Option<f64> {
        self.fields.get(&field).map(|s| s.value)
    }

    pub fn sample(&self, field: Field) -> Option<&FieldSample> {
        self.fields.get(&field)
    }

    /// Insert or replace an accepted sample
    pub fn accept(&mut self, field: Field, value: f64, source: TransportKind, at: DateTime<Utc>) {
        self.fields.insert(
            field,
            FieldSample {
                value,
                source,
                captured_at: at,
            },
        );
    }
}
