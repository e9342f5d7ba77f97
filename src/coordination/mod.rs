//! Coordination layer: state aggregation and emergency shutdown.
//!
//! - Pure derivation of the system-wide failover state from the registry
//! - Edge-triggered emergency controller driving the trading engine

pub mod aggregator;
pub mod emergency;

pub use aggregator::{derive_state, StatePublisher};
pub use emergency::EmergencyController;
