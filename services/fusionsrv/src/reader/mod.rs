//! Device readers
//!
//! One reader per transport style: the cloud reader issues a single batched
//! request and fans out per device, the local reader walks register ranges
//! with per-range failure isolation. Both translate vendor field keys to
//! canonical fields at this boundary.

pub mod cloud;
pub mod local;

use std::collections::HashMap;
use tracing::debug;

use fusion_model::{DeviceSerial, Field};

pub use cloud::CloudReader;
pub use local::{LocalPollOutcome, LocalReader};

/// Translate a vendor payload into canonical fields. Unknown keys are
/// dropped with a debug log; they are a vendor-table gap, not corruption.
pub(crate) fn map_vendor_fields(
    device: &DeviceSerial,
    raw: &HashMap<String, f64>,
) -> HashMap<Field, f64> {
    let mut fields = HashMap::with_capacity(raw.len());
    for (key, value) in raw {
        match Field::from_vendor_key(key) {
            Some(field) => {
                fields.insert(field, *value);
            }
            None => {
                debug!(device = %device, key = %key, "unknown vendor field key, dropped");
            }
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_vendor_keys_are_dropped() {
        let device = DeviceSerial::new("INV-001");
        let mut raw = HashMap::new();
        raw.insert("fac".to_string(), 50.0);
        raw.insert("mystery_key".to_string(), 1.0);

        let mapped = map_vendor_fields(&device, &raw);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[&Field::GridFrequency], 50.0);
    }
}
