//! Supervision layer: component registry, periodic health monitoring and
//! automatic recovery.
//!
//! - Registry holding the record for every monitored dependency
//! - Health monitor probing components on a fixed interval
//! - Recovery manager scheduling backoff-delayed, cancellable attempts
//! - Bounded audit history of recovery outcomes

pub mod history;
pub mod monitor;
pub mod recovery;
pub mod registry;

pub use history::{RecoveryHistory, RecoveryRecord};
pub use monitor::HealthMonitor;
pub use recovery::RecoveryManager;
pub use registry::ComponentRegistry;
