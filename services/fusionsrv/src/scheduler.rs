//! Endpoint scheduler
//!
//! Decides, once per coordinator tick, which endpoints are due and groups
//! devices by physical link. Groups with distinct endpoint identities run
//! concurrently; within one group the coordinator reads devices strictly
//! sequentially, because a shared link tolerates exactly one open session.

use std::sync::Arc;
use tokio::time::Instant;

use fusion_model::{DeviceSerial, EndpointKey};

use crate::registry::TransportRegistry;

/// One unit of work for a tick: a physical link and the devices behind it
#[derive(Debug, Clone)]
pub struct EndpointGroup {
    pub key: EndpointKey,
    pub devices: Vec<DeviceSerial>,
}

/// Target of an external "refresh now" request
#[derive(Debug, Clone)]
pub enum RefreshTarget {
    All,
    Device(DeviceSerial),
}

pub struct EndpointScheduler {
    registry: Arc<TransportRegistry>,
}

impl EndpointScheduler {
    pub fn new(registry: Arc<TransportRegistry>) -> Self {
        Self { registry }
    }

    /// Endpoint groups due at `now` per interval gating
    pub fn due_groups(&self, now: Instant) -> Vec<EndpointGroup> {
        self.registry
            .slots()
            .iter()
            .filter(|slot| self.registry.is_due(&slot.entry.key(), now))
            .map(|slot| EndpointGroup {
                key: slot.entry.key(),
                devices: slot.entry.devices.clone(),
            })
            .collect()
    }

    /// Groups for a forced refresh, bypassing interval gating. The work
    /// still flows through the normal read→validate→merge→publish pipeline.
    pub fn forced_groups(&self, target: &RefreshTarget) -> Vec<EndpointGroup> {
        self.registry
            .slots()
            .iter()
            .filter_map(|slot| {
                let devices: Vec<DeviceSerial> = match target {
                    RefreshTarget::All => slot.entry.devices.clone(),
                    RefreshTarget::Device(serial) => slot
                        .entry
                        .devices
                        .iter()
                        .filter(|d| *d == serial)
                        .cloned()
                        .collect(),
                };
                if devices.is_empty() {
                    None
                } else {
                    Some(EndpointGroup {
                        key: slot.entry.key(),
                        devices,
                    })
                }
            })
            .collect()
    }
}
