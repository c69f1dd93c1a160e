//! Transport seam: client trait, typed errors, the simulated backend and
//! the test mock

pub mod mock;
pub mod sim;
pub mod traits;

pub use mock::MockTransport;
pub use sim::SimTransport;
pub use traits::{RangePayload, ReadRange, TransportClient, TransportError};
