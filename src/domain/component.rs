//! Component records and the status escalation policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status of a monitored component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is operating normally
    Healthy,
    /// A few consecutive probe failures
    Warning,
    /// Sustained probe failures
    Critical,
    /// Component is considered down
    Failed,
    /// A recovery attempt is scheduled or running
    Recovering,
}

impl ComponentStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ComponentStatus::Healthy)
    }

    /// Statuses that qualify for automatic recovery
    pub fn needs_recovery(&self) -> bool {
        matches!(
            self,
            ComponentStatus::Warning | ComponentStatus::Critical | ComponentStatus::Failed
        )
    }
}

impl std::fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentStatus::Healthy => write!(f, "healthy"),
            ComponentStatus::Warning => write!(f, "warning"),
            ComponentStatus::Critical => write!(f, "critical"),
            ComponentStatus::Failed => write!(f, "failed"),
            ComponentStatus::Recovering => write!(f, "recovering"),
        }
    }
}

/// Current record for a single monitored component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub name: String,
    pub status: ComponentStatus,
    /// Failure of a critical component can escalate the global state to emergency
    pub critical: bool,
    /// Consecutive failed probes since the last success or reset
    pub failure_count: u32,
    /// Recovery attempts since entering a non-healthy status
    pub recovery_attempts: u32,
    /// Timestamp of the most recent probe
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub registered_at: DateTime<Utc>,
}

impl ComponentRecord {
    pub fn new(name: &str, critical: bool) -> Self {
        Self {
            name: name.to_string(),
            status: ComponentStatus::Healthy,
            critical,
            failure_count: 0,
            recovery_attempts: 0,
            last_check: None,
            last_error: None,
            registered_at: Utc::now(),
        }
    }

    /// Clear counters and return to healthy. Both counters reset together,
    /// on a successful probe while non-healthy or on an explicit reset.
    pub fn mark_healthy(&mut self) {
        self.status = ComponentStatus::Healthy;
        self.failure_count = 0;
        self.recovery_attempts = 0;
        self.last_error = None;
    }
}

/// Threshold table mapping consecutive probe failures to a status.
///
/// Thresholds must be strictly increasing so escalation is monotonic and a
/// single-step failure never skips a severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    pub warning_after: u32,
    pub critical_after: u32,
    pub failed_after: u32,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            warning_after: 1,
            critical_after: 3,
            failed_after: 5,
        }
    }
}

impl EscalationPolicy {
    /// Status implied by a consecutive failure count
    pub fn status_for(&self, failure_count: u32) -> ComponentStatus {
        if failure_count >= self.failed_after {
            ComponentStatus::Failed
        } else if failure_count >= self.critical_after {
            ComponentStatus::Critical
        } else if failure_count >= self.warning_after {
            ComponentStatus::Warning
        } else {
            ComponentStatus::Healthy
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.warning_after == 0 {
            return Err("escalation.warning_after must be at least 1".to_string());
        }
        if self.warning_after >= self.critical_after {
            return Err(
                "escalation.critical_after must be greater than escalation.warning_after"
                    .to_string(),
            );
        }
        if self.critical_after >= self.failed_after {
            return Err(
                "escalation.failed_after must be greater than escalation.critical_after"
                    .to_string(),
            );
        }
        Ok(())
    }
}
