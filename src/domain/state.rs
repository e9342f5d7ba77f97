//! System-wide failover state.

use serde::{Deserialize, Serialize};

/// Single system-wide severity level derived from all component records.
///
/// Never set directly; recomputed from a registry snapshot after every
/// mutation (see `coordination::aggregator`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailoverState {
    /// All components healthy, or monitoring disabled
    Normal,
    /// Non-critical degradation somewhere
    Degraded,
    /// A critical component is critical or failed
    Failover,
    /// At least one component has recovery in progress
    Recovery,
    /// A critical component failed and exhausted recovery
    Emergency,
}

impl FailoverState {
    pub fn is_emergency(&self) -> bool {
        matches!(self, FailoverState::Emergency)
    }
}

impl std::fmt::Display for FailoverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailoverState::Normal => write!(f, "normal"),
            FailoverState::Degraded => write!(f, "degraded"),
            FailoverState::Failover => write!(f, "failover"),
            FailoverState::Recovery => write!(f, "recovery"),
            FailoverState::Emergency => write!(f, "emergency"),
        }
    }
}
