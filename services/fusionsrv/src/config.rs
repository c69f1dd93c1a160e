//! Service configuration
//!
//! Layered figment loading: TOML file first, `FUSIONSRV_` environment
//! variables on top. Read once at startup and on reconfiguration.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use fusion_model::{DeviceSerial, DeviceSpec, EndpointKey, TransportKind};

use crate::error::{FusionError, Result};

fn default_true() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    30
}

fn default_timeout_ms() -> u64 {
    2_000
}

fn default_static_ttl() -> u64 {
    3_600
}

fn default_log_cooldown() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One configured transport endpoint, possibly serving many devices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportEntry {
    pub kind: TransportKind,
    /// Endpoint identity: host:port, tty path, or cloud account id
    pub endpoint: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// TTL for cached static fields read through this endpoint
    #[serde(default = "default_static_ttl")]
    pub static_ttl_secs: u64,
    /// Serials of the devices reachable through this endpoint
    pub devices: Vec<DeviceSerial>,
}

impl TransportEntry {
    pub fn key(&self) -> EndpointKey {
        EndpointKey::new(self.kind, self.endpoint.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn static_ttl(&self) -> Duration {
        Duration::from_secs(self.static_ttl_secs)
    }
}

/// Parallel group membership
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    pub members: Vec<DeviceSerial>,
}

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Coordinator tick interval
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// User-facing canary toggle. Monotonicity checks stay on regardless.
    #[serde(default = "default_true")]
    pub canary_enabled: bool,
    /// Rejection log cooldown per (device, field)
    #[serde(default = "default_log_cooldown")]
    pub rejection_log_cooldown_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    #[serde(default)]
    pub transports: Vec<TransportEntry>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

impl ServiceConfig {
    /// Load from a TOML file with environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let config: ServiceConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("FUSIONSRV_").split("__"))
            .extract()
            .map_err(|e| FusionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string (tests, embedded defaults)
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config: ServiceConfig = Figment::new()
            .merge(Toml::string(toml))
            .extract()
            .map_err(|e| FusionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn rejection_log_cooldown(&self) -> Duration {
        Duration::from_secs(self.rejection_log_cooldown_secs)
    }

    pub fn device(&self, serial: &DeviceSerial) -> Option<&DeviceSpec> {
        self.devices.iter().find(|d| &d.serial == serial)
    }

    /// Structural validation. Broken references are hard errors; suspicious
    /// but survivable shapes (empty groups, unknown group members) are
    /// logged here and suppressed at aggregation time.
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(&device.serial) {
                return Err(FusionError::Config(format!(
                    "duplicate device serial: {}",
                    device.serial
                )));
            }
        }

        let known: HashSet<&DeviceSerial> = self.devices.iter().map(|d| &d.serial).collect();
        let mut endpoints = HashSet::new();
        for transport in &self.transports {
            // Two entries on one physical link would break per-endpoint
            // serialization: the gate is keyed by (kind, endpoint).
            if !endpoints.insert(transport.key()) {
                return Err(FusionError::Config(format!(
                    "duplicate transport endpoint: {}",
                    transport.key()
                )));
            }
            if transport.devices.is_empty() {
                return Err(FusionError::Config(format!(
                    "transport {} serves no devices",
                    transport.key()
                )));
            }
            for serial in &transport.devices {
                if !known.contains(serial) {
                    return Err(FusionError::Config(format!(
                        "transport {} lists unknown device {}",
                        transport.key(),
                        serial
                    )));
                }
            }
        }

        // Every transport kind a device claims must be backed by an endpoint
        // actually serving it.
        for device in &self.devices {
            for kind in &device.transports {
                let backed = self
                    .transports
                    .iter()
                    .any(|t| t.kind == *kind && t.devices.contains(&device.serial));
                if !backed {
                    return Err(FusionError::Config(format!(
                        "device {} assigned {} but no such endpoint serves it",
                        device.serial, kind
                    )));
                }
            }
        }

        for group in &self.groups {
            if group.members.is_empty() {
                warn!(group = %group.id, "group has zero expected members, aggregates will be suppressed");
            }
            for member in &group.members {
                if !known.contains(member) {
                    warn!(group = %group.id, member = %member, "group member not in device list");
                }
            }
        }

        Ok(())
    }
}
