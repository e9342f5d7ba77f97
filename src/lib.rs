pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod logging;
pub mod manager;
pub mod supervisor;
pub mod traits;

pub use config::{ConfigStore, FailoverConfig, FailoverConfigUpdate};
pub use coordination::{derive_state, EmergencyController, StatePublisher};
pub use domain::{ComponentRecord, ComponentStatus, EscalationPolicy, FailoverState};
pub use error::{KeelError, Result};
pub use manager::{FailoverManager, StatusReport};
pub use supervisor::{
    ComponentRegistry, HealthMonitor, RecoveryHistory, RecoveryManager, RecoveryRecord,
};
pub use traits::{
    FailoverEvent, HealthProbe, Notifier, ProbeResult, RecoveryHook, TradingEngine,
};
