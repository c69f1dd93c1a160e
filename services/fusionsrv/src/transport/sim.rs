//! Simulated transport backend
//!
//! Deterministic stand-in client for running the service without hardware
//! or cloud credentials. Produces plausible telemetry: lifetime counters
//! grow with elapsed time, instantaneous values wobble per device, and two
//! batteries answer on the secondary bus. Real deployments embed the
//! library and attach their own [`TransportClient`]s instead.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Instant;

use fusion_model::{BatteryReading, DeviceSerial, Field, TransportKind};
use tracing::info;

use super::traits::{RangePayload, ReadRange, TransportClient, TransportError};

#[derive(Debug)]
pub struct SimTransport {
    kind: TransportKind,
    started: Instant,
}

impl SimTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            started: Instant::now(),
        }
    }

    /// Stable per-device offset so fleet members do not report identical
    /// values
    fn seed(device: &DeviceSerial) -> f64 {
        device
            .as_str()
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32)) as f64
            % 97.0
    }

    fn elapsed_hours(&self) -> f64 {
        self.started.elapsed().as_secs_f64() / 3600.0
    }

    fn batteries(seed: f64) -> Vec<BatteryReading> {
        vec![
            BatteryReading {
                index: 0,
                soc: 70.0 + seed % 20.0,
                current: 4.0,
                current_capacity: 280.0 * (0.70 + (seed % 20.0) / 100.0),
                max_capacity: 280.0,
            },
            BatteryReading {
                index: 1,
                soc: 65.0 + seed % 25.0,
                current: 3.5,
                current_capacity: 280.0 * (0.65 + (seed % 25.0) / 100.0),
                max_capacity: 280.0,
            },
        ]
    }
}

#[async_trait]
impl TransportClient for SimTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn read_range(
        &self,
        device: &DeviceSerial,
        range: ReadRange,
    ) -> Result<RangePayload, TransportError> {
        let seed = Self::seed(device);
        let payload = match range {
            ReadRange::Realtime => RangePayload::default()
                .with_field("reg_pv_power", 3_000.0 + seed * 10.0)
                .with_field("reg_load_power", 800.0 + seed * 2.0)
                .with_field("reg_bat_power", 1_200.0 + seed)
                .with_field("reg_bat_current", 7.5)
                .with_field("reg_grid_freq", 50.0)
                .with_field("reg_e_pv_total", 1_369.2 + self.elapsed_hours() * 3.0 + seed)
                .with_field("reg_port_status", 0b00_10_01 as f64),
            ReadRange::Phases => RangePayload::default()
                .with_field("reg_phase_a_current", 6.0 + seed / 50.0)
                .with_field("reg_phase_b_current", 6.1)
                .with_field("reg_phase_c_current", 5.9)
                .with_field("reg_inv_temp", 42.0 + seed / 20.0)
                .with_field("reg_rad_temp", 38.5),
            ReadRange::BatteryBank => {
                let mut payload = RangePayload::default()
                    .with_field("reg_bat_soc", 72.0 + seed % 10.0);
                payload.batteries = Self::batteries(seed);
                payload
            }
            ReadRange::StaticInfo => RangePayload::default()
                .with_field("reg_fw_code", 30_201.0)
                .with_field("reg_rated_power", 12_000.0),
        };
        Ok(payload)
    }

    async fn read_batch(
        &self,
        devices: &[DeviceSerial],
    ) -> Result<HashMap<DeviceSerial, RangePayload>, TransportError> {
        let mut batch = HashMap::with_capacity(devices.len());
        for device in devices {
            let seed = Self::seed(device);
            let payload = RangePayload::default()
                .with_field("ppv", 3_000.0 + seed * 10.0)
                .with_field("pLoad", 820.0 + seed * 2.0)
                .with_field("fac", 50.0)
                .with_field("soc", 72.0 + seed % 10.0)
                .with_field("ePvTotal", 1_369.2 + self.elapsed_hours() * 3.0 + seed)
                .with_field("tInv", 41.0 + seed / 20.0);
            batch.insert(device.clone(), payload);
        }
        Ok(batch)
    }

    async fn write_param(
        &self,
        device: &DeviceSerial,
        field: Field,
        value: f64,
    ) -> Result<(), TransportError> {
        info!(device = %device, field = %field, value, "simulated parameter write");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifetime_counter_never_decreases() {
        let sim = SimTransport::new(TransportKind::ModbusTcp);
        let device = DeviceSerial::new("INV-001");
        let first = sim.read_range(&device, ReadRange::Realtime).await.unwrap();
        let second = sim.read_range(&device, ReadRange::Realtime).await.unwrap();
        assert!(second.fields["reg_e_pv_total"] >= first.fields["reg_e_pv_total"]);
    }

    #[tokio::test]
    async fn distinct_devices_report_distinct_values() {
        let sim = SimTransport::new(TransportKind::Cloud);
        let devices = [DeviceSerial::new("INV-001"), DeviceSerial::new("INV-002")];
        let batch = sim.read_batch(&devices).await.unwrap();
        assert_ne!(
            batch[&devices[0]].fields["ppv"],
            batch[&devices[1]].fields["ppv"]
        );
    }
}
