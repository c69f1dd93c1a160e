//! Cloud device reader
//!
//! One batched request per poll cycle returns data for many devices; the
//! fan-out to per-device readings happens after the single response arrives.
//! Auth failures are a distinct error surfaced for external re-login, never
//! silently retried here.

use std::collections::HashMap;
use tracing::warn;

use fusion_model::{DeviceSerial, RawReading, TransportKind};

use super::map_vendor_fields;
use crate::error::{FusionError, Result};
use crate::registry::TransportSlot;
use crate::transport::TransportError;

pub struct CloudReader;

impl CloudReader {
    /// Poll all devices behind one cloud endpoint in one request.
    ///
    /// Devices missing from the response simply produce no reading this
    /// cycle; the validator's retention keeps their last accepted values.
    pub async fn poll(
        slot: &TransportSlot,
        devices: &[DeviceSerial],
    ) -> Result<HashMap<DeviceSerial, RawReading>> {
        let key = slot.entry.key();

        let batch = tokio::time::timeout(slot.entry.timeout(), slot.client.read_batch(devices))
            .await
            .map_err(|_| FusionError::Timeout {
                endpoint: key.clone(),
            })?
            .map_err(|e| match e {
                TransportError::AuthRequired(reason) => FusionError::AuthRequired {
                    endpoint: key.clone(),
                    reason,
                },
                TransportError::Timeout(_) => FusionError::Timeout {
                    endpoint: key.clone(),
                },
                other => FusionError::Transport {
                    endpoint: key.clone(),
                    source: other,
                },
            })?;

        let mut readings = HashMap::with_capacity(batch.len());
        for (serial, payload) in batch {
            if !devices.contains(&serial) {
                warn!(device = %serial, endpoint = %key, "cloud response for unlisted device, dropped");
                continue;
            }
            let mut reading = RawReading::new(TransportKind::Cloud);
            reading.fields = map_vendor_fields(&serial, &payload.fields);
            if !payload.batteries.is_empty() {
                reading.batteries = Some(payload.batteries);
            }
            readings.insert(serial, reading);
        }
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportEntry;
    use crate::transport::{MockTransport, RangePayload};
    use fusion_model::Field;
    use std::sync::Arc;

    fn slot(mock: MockTransport) -> TransportSlot {
        TransportSlot {
            entry: TransportEntry {
                kind: TransportKind::Cloud,
                endpoint: "acct-1".to_string(),
                poll_interval_secs: 60,
                timeout_ms: 1000,
                static_ttl_secs: 3600,
                devices: vec![DeviceSerial::new("INV-001"), DeviceSerial::new("INV-002")],
            },
            client: Arc::new(mock),
        }
    }

    #[tokio::test]
    async fn batch_fans_out_per_device() {
        let mock = MockTransport::new(TransportKind::Cloud);
        let mut batch = HashMap::new();
        batch.insert(
            DeviceSerial::new("INV-001"),
            RangePayload::default()
                .with_field("ppv", 3000.0)
                .with_field("fac", 50.0),
        );
        batch.insert(
            DeviceSerial::new("INV-002"),
            RangePayload::default().with_field("ppv", 2500.0),
        );
        mock.push_batch(batch);

        let slot = slot(mock);
        let devices = slot.entry.devices.clone();
        let readings = CloudReader::poll(&slot, &devices).await.unwrap();

        assert_eq!(readings.len(), 2);
        let first = &readings[&DeviceSerial::new("INV-001")];
        assert_eq!(first.fields[&Field::PvPower], 3000.0);
        assert_eq!(first.provenance, TransportKind::Cloud);
    }

    #[tokio::test]
    async fn auth_failure_is_surfaced_not_retried() {
        let mock = MockTransport::new(TransportKind::Cloud);
        mock.push_batch_error(TransportError::AuthRequired("token expired".into()));

        let slot = slot(mock.clone());
        let devices = slot.entry.devices.clone();
        let err = CloudReader::poll(&slot, &devices).await.unwrap_err();

        assert!(matches!(err, FusionError::AuthRequired { .. }));
        assert!(err.needs_external_action());
        // Exactly one call: no local retry happened.
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn missing_device_yields_no_reading() {
        let mock = MockTransport::new(TransportKind::Cloud);
        let mut batch = HashMap::new();
        batch.insert(
            DeviceSerial::new("INV-001"),
            RangePayload::default().with_field("ppv", 3000.0),
        );
        mock.push_batch(batch);

        let slot = slot(mock);
        let devices = slot.entry.devices.clone();
        let readings = CloudReader::poll(&slot, &devices).await.unwrap();
        assert!(!readings.contains_key(&DeviceSerial::new("INV-002")));
    }
}
