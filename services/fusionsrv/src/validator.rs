//! Reading validator
//!
//! Applies the canary bounds policy and the mandatory lifetime-counter
//! monotonicity rule to raw readings. The output holds only the fields
//! accepted this tick; the overlay/merge step combines it with the prior
//! published state so a rejected reading never overwrites the last accepted
//! value. Rejections are logged at most once per (device, field) per
//! cooldown window.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use fusion_model::{
    AcceptedReading, CanaryPolicy, CanaryVerdict, DeviceSerial, Field, RawReading,
    ValidatedReading,
};

use crate::error::FusionError;

pub struct Validator {
    policy: CanaryPolicy,
    /// User-facing toggle; covers canary bounds only
    canary_enabled: bool,
    /// Highest accepted value per lifetime counter. Survives rejected
    /// ticks; cleared only on reconfiguration.
    high_water: DashMap<(DeviceSerial, Field), f64>,
    last_logged: DashMap<(DeviceSerial, Field), Instant>,
    log_cooldown: Duration,
}

impl Validator {
    pub fn new(policy: CanaryPolicy, canary_enabled: bool, log_cooldown: Duration) -> Self {
        Self {
            policy,
            canary_enabled,
            high_water: DashMap::new(),
            last_logged: DashMap::new(),
            log_cooldown,
        }
    }

    /// Screen one raw reading. Returns only the fields accepted this tick;
    /// rejected and absent fields are left to the merge step's retention.
    pub fn validate(
        &self,
        device: &DeviceSerial,
        raw: &RawReading,
        prior: Option<&ValidatedReading>,
    ) -> AcceptedReading {
        let mut accepted = AcceptedReading::default();

        // Cross-field invariant: remaining capacity can never exceed design
        // capacity. The pair arrives in one register block, so a violation
        // means the whole record is corrupt, not a single field.
        if self.canary_enabled {
            if let (Some(&current), Some(&max)) = (
                raw.fields.get(&Field::CurrentCapacity),
                raw.fields.get(&Field::MaxCapacity),
            ) {
                if current > max {
                    self.log_rejection(device, Field::CurrentCapacity, || {
                        warn!(device = %device, current, max, source = %raw.provenance,
                              "capacity pair inverted, dropping whole record");
                    });
                    return accepted;
                }
            }
        }

        for (&field, &value) in &raw.fields {
            if self.canary_enabled {
                match self.policy.check(field, value) {
                    CanaryVerdict::Pass => {}
                    CanaryVerdict::OutOfBounds { lower, upper } => {
                        let err = FusionError::CanaryRejection {
                            device: device.clone(),
                            field,
                            value,
                            lower,
                            upper,
                        };
                        self.log_rejection(device, field, || {
                            warn!(error = %err, source = %raw.provenance,
                                  "canary rejection, prior value stands");
                        });
                        continue;
                    }
                    CanaryVerdict::NotFinite => {
                        self.log_rejection(device, field, || {
                            warn!(device = %device, field = %field, source = %raw.provenance,
                                  "non-finite value, prior value stands");
                        });
                        continue;
                    }
                }
            } else if !value.is_finite() {
                // Even with canary off, NaN must never enter the snapshot.
                continue;
            }

            // Monotonicity is a physical invariant, independent of the
            // canary toggle.
            if field.is_lifetime() {
                if let Some(floor) = self.lifetime_violation(device, field, value, prior) {
                    let err = FusionError::MonotonicityViolation {
                        device: device.clone(),
                        field,
                        value,
                        accepted: floor,
                    };
                    self.log_rejection(device, field, || {
                        warn!(error = %err, source = %raw.provenance,
                              "lifetime counter decreased, rejecting");
                    });
                    continue;
                }
            }

            accepted.fields.insert(
                field,
                fusion_model::FieldSample {
                    value,
                    source: raw.provenance,
                    captured_at: raw.captured_at,
                },
            );
        }

        accepted.batteries = raw.batteries.clone();
        accepted
    }

    /// Returns the accepted floor the value regressed below, or `None`
    /// when the value may be accepted (updating the high-water mark).
    fn lifetime_violation(
        &self,
        device: &DeviceSerial,
        field: Field,
        value: f64,
        prior: Option<&ValidatedReading>,
    ) -> Option<f64> {
        let key = (device.clone(), field);
        let floor = self
            .high_water
            .get(&key)
            .map(|v| *v)
            .or_else(|| prior.and_then(|p| p.get(field)));

        if let Some(floor) = floor {
            if value < floor {
                return Some(floor);
            }
        }
        self.high_water.insert(key, value);
        None
    }

    fn log_rejection(&self, device: &DeviceSerial, field: Field, log: impl FnOnce()) {
        let key = (device.clone(), field);
        let now = Instant::now();
        let should_log = self
            .last_logged
            .get(&key)
            .map(|at| now.duration_since(*at) >= self.log_cooldown)
            .unwrap_or(true);
        if should_log {
            self.last_logged.insert(key, now);
            log();
        }
    }

    /// Forget per-device state on reconfiguration: a replaced inverter may
    /// legitimately restart its lifetime counters.
    pub fn reset_device(&self, device: &DeviceSerial) {
        self.high_water.retain(|(serial, _), _| serial != device);
        self.last_logged.retain(|(serial, _), _| serial != device);
    }
}
