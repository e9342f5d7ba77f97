//! Contracts the failover core requires from its collaborators.
//!
//! Probes and recovery actions are supplied per registered component; the
//! trading engine and notifier are wired once on the manager. All of them
//! are invoked with a timeout supplied by the core.

use crate::domain::{ComponentStatus, FailoverState};
use crate::error::Result;
use async_trait::async_trait;

/// Reading reported by a single health probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Component is fully operational
    Pass,
    /// Component responds but below expectations
    Degraded(String),
    /// Component is not operational
    Fail(String),
}

impl ProbeResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, ProbeResult::Pass)
    }
}

/// External health check for one component.
///
/// How a component decides its own health is out of scope here; the core
/// only consumes the reading.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> ProbeResult;
}

/// External recovery action for one component, distinct from its probe
#[async_trait]
pub trait RecoveryHook: Send + Sync {
    async fn recover(&self) -> std::result::Result<(), String>;
}

/// Executes the stop-trading / close-all-positions action during emergency
/// shutdown
#[async_trait]
pub trait TradingEngine: Send + Sync {
    async fn shutdown(&self, reason: &str) -> Result<()>;
}

/// Delivers failover events to an external channel (messaging, paging, ...)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &FailoverEvent) -> Result<()>;
}

/// Events broadcast by the failover core
#[derive(Debug, Clone)]
pub enum FailoverEvent {
    /// A component's status escalated or changed
    StatusChanged {
        component: String,
        from: ComponentStatus,
        to: ComponentStatus,
    },
    /// A component returned to healthy (probe success or recovery success)
    ComponentRecovered { component: String },
    /// A recovery attempt is starting
    RecoveryAttempt { component: String, attempt: u32 },
    /// A recovery attempt failed
    RecoveryFailed {
        component: String,
        attempt: u32,
        error: String,
    },
    /// Automatic recovery gave up for a component
    RecoveryExhausted { component: String, attempts: u32 },
    /// The aggregated failover state changed
    StateChanged {
        from: FailoverState,
        to: FailoverState,
    },
    /// Emergency shutdown was invoked
    EmergencyShutdown { reason: String, manual: bool },
    /// The trading engine rejected or failed the shutdown call
    EmergencyShutdownFailed { reason: String, error: String },
}
