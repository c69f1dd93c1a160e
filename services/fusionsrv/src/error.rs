//! Fusion service error types

use fusion_model::{DeviceSerial, EndpointKey, Field};
use thiserror::Error;

use crate::transport::TransportError;

/// Result type for fusionsrv operations
pub type Result<T> = std::result::Result<T, FusionError>;

/// Fusion engine errors.
///
/// Everything except `AuthRequired` and `Config` is recovered inside the
/// tick: the affected fields fall back to the last accepted value and the
/// device is flagged degraded where warranted.
#[derive(Debug, Error, Clone)]
pub enum FusionError {
    /// Read exceeded the per-transport timeout; retried next tick
    #[error("Transport timeout on {endpoint}")]
    Timeout { endpoint: EndpointKey },

    /// Session/auth renewal needed; surfaced to the external layer,
    /// never retried locally
    #[error("Re-authentication required for {endpoint}: {reason}")]
    AuthRequired {
        endpoint: EndpointKey,
        reason: String,
    },

    /// One register range failed; remaining ranges proceed
    #[error("Range read failed for {device} ({range}): {reason}")]
    PartialRangeRead {
        device: DeviceSerial,
        range: String,
        reason: String,
    },

    /// Value outside canary bounds; field dropped, prior value retained
    #[error("Canary rejection for {device}.{field}: {value} outside [{lower}, {upper}]")]
    CanaryRejection {
        device: DeviceSerial,
        field: Field,
        value: f64,
        lower: f64,
        upper: f64,
    },

    /// Lifetime counter decreased; rejected regardless of configuration
    #[error("Monotonicity violation for {device}.{field}: {value} < accepted {accepted}")]
    MonotonicityViolation {
        device: DeviceSerial,
        field: Field,
        value: f64,
        accepted: f64,
    },

    /// Broken configuration detected at runtime; aggregate suppressed
    #[error("Config inconsistency: {0}")]
    ConfigInconsistency(String),

    /// Unrecoverable configuration error at load time
    #[error("Configuration error: {0}")]
    Config(String),

    /// Other transport failure
    #[error("Transport error on {endpoint}: {source}")]
    Transport {
        endpoint: EndpointKey,
        source: TransportError,
    },
}

impl FusionError {
    /// Errors that must propagate to the external layer for user action
    pub fn needs_external_action(&self) -> bool {
        matches!(
            self,
            FusionError::AuthRequired { .. } | FusionError::Config(_)
        )
    }
}
