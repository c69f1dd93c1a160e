//! Local device reader (Modbus-TCP / dongle / serial)
//!
//! Reads a fixed set of register ranges per device. Ranges fail
//! independently: a bad range logs, its fields are simply absent from the
//! reading, and the remaining ranges still execute. A timeout abandons the
//! rest of the device's ranges for this tick since the link itself is
//! wedged. Static ranges are served from the registry cache until the TTL
//! expires or the cache is invalidated.

use tokio::time::Instant;
use tracing::warn;

use fusion_model::{DeviceSpec, RawReading};

use super::map_vendor_fields;
use crate::error::FusionError;
use crate::registry::{TransportRegistry, TransportSlot};
use crate::transport::{ReadRange, TransportError};

/// Result of polling one device over a local link
#[derive(Debug)]
pub struct LocalPollOutcome {
    pub reading: RawReading,
    /// Range-level failures, already logged
    pub errors: Vec<FusionError>,
    /// The device read was abandoned mid-way on a link timeout
    pub timed_out: bool,
}

impl LocalPollOutcome {
    /// A poll counts as successful when at least one range produced data
    pub fn is_success(&self) -> bool {
        !self.timed_out && !self.reading.is_empty()
    }
}

pub struct LocalReader;

impl LocalReader {
    pub async fn poll_device(
        registry: &TransportRegistry,
        slot: &TransportSlot,
        spec: &DeviceSpec,
        now: Instant,
    ) -> LocalPollOutcome {
        let key = slot.entry.key();
        let mut reading = RawReading::new(slot.entry.kind);
        let mut errors = Vec::new();

        for range in slot.client.describe_ranges(spec) {
            if range.is_static() {
                if let Some(cached) = registry.cached_static(&spec.serial, &key, now) {
                    reading
                        .fields
                        .extend(map_vendor_fields(&spec.serial, &cached.fields));
                    continue;
                }
            }

            let result =
                tokio::time::timeout(slot.entry.timeout(), slot.client.read_range(&spec.serial, range))
                    .await;

            match result {
                Err(_) => {
                    warn!(device = %spec.serial, endpoint = %key, range = %range, "read timed out, abandoning device for this tick");
                    errors.push(FusionError::Timeout {
                        endpoint: key.clone(),
                    });
                    return LocalPollOutcome {
                        reading,
                        errors,
                        timed_out: true,
                    };
                }
                Ok(Err(TransportError::Timeout(reason))) => {
                    warn!(device = %spec.serial, endpoint = %key, range = %range, reason = %reason, "transport reported timeout, abandoning device for this tick");
                    errors.push(FusionError::Timeout {
                        endpoint: key.clone(),
                    });
                    return LocalPollOutcome {
                        reading,
                        errors,
                        timed_out: true,
                    };
                }
                Ok(Err(e)) => {
                    // Isolated to this range; the rest of the device still reads.
                    warn!(device = %spec.serial, endpoint = %key, range = %range, error = %e, "range read failed");
                    errors.push(FusionError::PartialRangeRead {
                        device: spec.serial.clone(),
                        range: range.as_str().to_string(),
                        reason: e.to_string(),
                    });
                }
                Ok(Ok(payload)) => {
                    if range.is_static() {
                        registry.store_static(&spec.serial, &key, payload.clone(), now);
                    }
                    reading
                        .fields
                        .extend(map_vendor_fields(&spec.serial, &payload.fields));
                    if range == ReadRange::BatteryBank {
                        reading.batteries = Some(payload.batteries);
                    }
                }
            }
        }

        LocalPollOutcome {
            reading,
            errors,
            timed_out: false,
        }
    }
}
