//! Transport registry
//!
//! Holds the configured transports together with their gating state. All
//! interval gating, failure counting and the static-field cache are keyed by
//! [`EndpointKey`], never per device: devices sharing one physical link
//! share one gate.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::time::Instant;

use fusion_model::{DeviceSerial, EndpointHealth, EndpointKey};

use crate::config::TransportEntry;
use crate::transport::{RangePayload, TransportClient};

/// Consecutive failed cycles after which an endpoint's devices are reported
/// degraded (still polled, labeled uncertain)
pub const DEGRADED_THRESHOLD: u32 = 3;

/// One configured endpoint with its external client
#[derive(Debug, Clone)]
pub struct TransportSlot {
    pub entry: TransportEntry,
    pub client: Arc<dyn TransportClient>,
}

#[derive(Debug, Default)]
struct GateState {
    last_attempt: Option<Instant>,
    consecutive_failures: u32,
    attempts: u64,
    successes: u64,
    failures: u64,
    last_success: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct CachedPayload {
    payload: RangePayload,
    fetched_at: Instant,
}

/// Registry of transports and their per-endpoint gate state
pub struct TransportRegistry {
    slots: Vec<TransportSlot>,
    gates: DashMap<EndpointKey, GateState>,
    static_cache: DashMap<(DeviceSerial, EndpointKey), CachedPayload>,
}

impl TransportRegistry {
    pub fn new(slots: Vec<TransportSlot>) -> Self {
        let gates = DashMap::new();
        for slot in &slots {
            gates.insert(slot.entry.key(), GateState::default());
        }
        Self {
            slots,
            gates,
            static_cache: DashMap::new(),
        }
    }

    pub fn slots(&self) -> &[TransportSlot] {
        &self.slots
    }

    pub fn slot(&self, key: &EndpointKey) -> Option<&TransportSlot> {
        self.slots.iter().find(|s| s.entry.key() == *key)
    }

    /// Due when never attempted or the poll interval has elapsed since the
    /// last attempt. Failures stamp attempts too, so a flapping endpoint is
    /// retried on its interval, not in a tight loop.
    pub fn is_due(&self, key: &EndpointKey, now: Instant) -> bool {
        let Some(slot) = self.slot(key) else {
            return false;
        };
        match self.gates.get(key).and_then(|g| g.last_attempt) {
            None => true,
            Some(at) => now.duration_since(at) >= slot.entry.poll_interval(),
        }
    }

    pub fn mark_attempt(&self, key: &EndpointKey, now: Instant) {
        let mut gate = self.gates.entry(key.clone()).or_default();
        gate.last_attempt = Some(now);
        gate.attempts += 1;
    }

    pub fn mark_success(&self, key: &EndpointKey) {
        let mut gate = self.gates.entry(key.clone()).or_default();
        gate.successes += 1;
        gate.consecutive_failures = 0;
        gate.last_success = Some(Utc::now());
    }

    /// Returns the new consecutive failure count
    pub fn mark_failure(&self, key: &EndpointKey) -> u32 {
        let mut gate = self.gates.entry(key.clone()).or_default();
        gate.failures += 1;
        gate.consecutive_failures += 1;
        gate.consecutive_failures
    }

    pub fn is_degraded(&self, key: &EndpointKey) -> bool {
        self.gates
            .get(key)
            .map(|g| g.consecutive_failures >= DEGRADED_THRESHOLD)
            .unwrap_or(false)
    }

    pub fn health(&self, key: &EndpointKey) -> EndpointHealth {
        self.gates
            .get(key)
            .map(|g| EndpointHealth {
                attempts: g.attempts,
                successes: g.successes,
                failures: g.failures,
                consecutive_failures: g.consecutive_failures,
                last_success: g.last_success,
            })
            .unwrap_or_default()
    }

    /// Cached static fields for a device on an endpoint, honoring the
    /// endpoint's TTL
    pub fn cached_static(
        &self,
        device: &DeviceSerial,
        key: &EndpointKey,
        now: Instant,
    ) -> Option<RangePayload> {
        let ttl = self.slot(key)?.entry.static_ttl();
        let cached = self.static_cache.get(&(device.clone(), key.clone()))?;
        if now.duration_since(cached.fetched_at) < ttl {
            Some(cached.payload.clone())
        } else {
            None
        }
    }

    pub fn store_static(
        &self,
        device: &DeviceSerial,
        key: &EndpointKey,
        payload: RangePayload,
        now: Instant,
    ) {
        self.static_cache.insert(
            (device.clone(), key.clone()),
            CachedPayload {
                payload,
                fetched_at: now,
            },
        );
    }

    /// Drop cached static fields for one device, forcing a re-read
    pub fn invalidate_static(&self, device: &DeviceSerial) {
        self.static_cache.retain(|(serial, _), _| serial != device);
    }

    /// Used on reconfiguration to forget history for a re-added endpoint
    pub fn reset_gate(&self, key: &EndpointKey) {
        self.gates.insert(key.clone(), GateState::default());
    }
}
