//! Multi-transport data coordination and fusion service.
//!
//! Polls a fleet of solar inverters over cloud, Modbus-TCP, dongle and
//! RS-485 transports, validates and fuses the readings per device, and
//! publishes atomically swapped fleet snapshots.

pub mod aggregator;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod overlay;
pub mod reader;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
pub mod transport;
pub mod validator;

pub use config::ServiceConfig;
pub use coordinator::Coordinator;
pub use error::{FusionError, Result};
pub use registry::{TransportRegistry, TransportSlot, DEGRADED_THRESHOLD};
pub use scheduler::{EndpointScheduler, RefreshTarget};
pub use snapshot::SnapshotStore;
pub use validator::Validator;
