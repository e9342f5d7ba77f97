//! Derives the system-wide failover state from component records.

use crate::config::{ConfigStore, FailoverConfig};
use crate::domain::{ComponentRecord, ComponentStatus, FailoverState};
use crate::supervisor::registry::ComponentRegistry;
use crate::traits::FailoverEvent;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

/// Compute the failover state for a registry snapshot.
///
/// Pure and deterministic. Precedence, highest first:
/// 1. monitoring disabled
/// 2. critical component failed with recovery exhausted
/// 3. any component recovering
/// 4. critical component failed or critical
/// 5. any warning, or any non-critical component critical/failed
pub fn derive_state(records: &[ComponentRecord], config: &FailoverConfig) -> FailoverState {
    if !config.enabled {
        return FailoverState::Normal;
    }

    let exhausted_critical = records.iter().any(|r| {
        r.critical
            && r.status == ComponentStatus::Failed
            && r.recovery_attempts >= config.max_recovery_attempts
    });
    if exhausted_critical {
        return FailoverState::Emergency;
    }

    if records
        .iter()
        .any(|r| r.status == ComponentStatus::Recovering)
    {
        return FailoverState::Recovery;
    }

    let critical_degraded = records.iter().any(|r| {
        r.critical
            && matches!(
                r.status,
                ComponentStatus::Critical | ComponentStatus::Failed
            )
    });
    if critical_degraded {
        return FailoverState::Failover;
    }

    let any_degraded = records.iter().any(|r| {
        r.status == ComponentStatus::Warning
            || (!r.critical
                && matches!(
                    r.status,
                    ComponentStatus::Critical | ComponentStatus::Failed
                ))
    });
    if any_degraded {
        return FailoverState::Degraded;
    }

    FailoverState::Normal
}

/// Recomputes the derived state on demand and publishes it on change.
///
/// Every registry mutation path calls `refresh`, so the published state is
/// never stale beyond one monitor cycle.
pub struct StatePublisher {
    registry: Arc<ComponentRegistry>,
    config: Arc<ConfigStore>,
    state_tx: watch::Sender<FailoverState>,
    event_tx: broadcast::Sender<FailoverEvent>,
}

impl StatePublisher {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        config: Arc<ConfigStore>,
        event_tx: broadcast::Sender<FailoverEvent>,
    ) -> Self {
        let (state_tx, _) = watch::channel(FailoverState::Normal);
        Self {
            registry,
            config,
            state_tx,
            event_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<FailoverState> {
        self.state_tx.subscribe()
    }

    pub fn current(&self) -> FailoverState {
        *self.state_tx.borrow()
    }

    /// Recompute from the current registry snapshot and publish on change
    pub async fn refresh(&self) -> FailoverState {
        let records = self.registry.list().await;
        let config = self.config.get().await;
        let next = derive_state(&records, &config);

        let prev = *self.state_tx.borrow();
        if next != prev {
            self.state_tx.send_replace(next);
            let _ = self.event_tx.send(FailoverEvent::StateChanged {
                from: prev,
                to: next,
            });
            info!("Failover state: {} -> {}", prev, next);
        }
        next
    }
}
