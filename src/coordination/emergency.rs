//! Edge-triggered emergency shutdown controller.
//!
//! Watches the aggregated failover state and fires the trading engine
//! shutdown exactly once per entry into the emergency state. The latch
//! disarms only when the state leaves emergency, which is reachable only
//! through a manual reset of the offending component or a fresh probe
//! success.

use crate::config::ConfigStore;
use crate::coordination::aggregator::StatePublisher;
use crate::domain::FailoverState;
use crate::error::{KeelError, Result};
use crate::supervisor::recovery::RecoveryManager;
use crate::traits::{FailoverEvent, TradingEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

pub struct EmergencyController {
    config: Arc<ConfigStore>,
    recovery: Arc<RecoveryManager>,
    publisher: Arc<StatePublisher>,
    engine: Mutex<Option<Arc<dyn TradingEngine>>>,
    event_tx: broadcast::Sender<FailoverEvent>,
    /// One-shot latch, re-armed when the state leaves emergency
    engaged: AtomicBool,
}

impl EmergencyController {
    pub fn new(
        config: Arc<ConfigStore>,
        recovery: Arc<RecoveryManager>,
        publisher: Arc<StatePublisher>,
        event_tx: broadcast::Sender<FailoverEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            recovery,
            publisher,
            engine: Mutex::new(None),
            event_tx,
            engaged: AtomicBool::new(false),
        })
    }

    pub fn set_engine(&self, engine: Arc<dyn TradingEngine>) {
        if let Ok(mut guard) = self.engine.lock() {
            *guard = Some(engine);
        }
    }

    fn engine(&self) -> Option<Arc<dyn TradingEngine>> {
        self.engine.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }

    /// Spawn the state watcher
    pub fn start(
        self: &Arc<Self>,
        mut state_rx: watch::Receiver<FailoverState>,
    ) -> tokio::task::JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut prev = *state_rx.borrow();
            if prev.is_emergency() {
                controller.on_enter_emergency().await;
            }
            while state_rx.changed().await.is_ok() {
                let state = *state_rx.borrow();
                if state.is_emergency() && !prev.is_emergency() {
                    controller.on_enter_emergency().await;
                } else if !state.is_emergency() && prev.is_emergency() {
                    controller.disarm();
                }
                prev = state;
            }
        })
    }

    async fn on_enter_emergency(&self) {
        // Fire once per entry, not on every re-aggregation while emergency.
        if self.engaged.swap(true, Ordering::SeqCst) {
            return;
        }

        let config = self.config.get().await;
        if !config.emergency_shutdown_enabled {
            warn!("Emergency state reached but emergency shutdown is disabled");
            return;
        }

        // Failures here are already logged and notified.
        let _ = self
            .execute_shutdown("critical component exhausted recovery", false)
            .await;
    }

    /// Manual trigger from the operator.
    ///
    /// Bypasses escalation and the emergency_shutdown_enabled gate; the
    /// engine call has been issued (and awaited) before this returns.
    pub async fn trigger_manual(&self, reason: &str) -> Result<()> {
        info!("Manual emergency shutdown requested: {}", reason);
        self.execute_shutdown(reason, true).await
    }

    async fn execute_shutdown(&self, reason: &str, manual: bool) -> Result<()> {
        // No recovery attempt may start once the shutdown sequence begins.
        self.recovery.engage_lockout().await;

        error!("EMERGENCY SHUTDOWN: {}", reason);

        let timeout_secs = self.config.get().await.shutdown_timeout_secs;
        let result = match self.engine() {
            Some(engine) => {
                match tokio::time::timeout(
                    std::time::Duration::from_secs(timeout_secs),
                    engine.shutdown(reason),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(KeelError::EngineShutdown(format!(
                        "timed out after {}s",
                        timeout_secs
                    ))),
                }
            }
            None => {
                error!("No trading engine wired; emergency shutdown has no effect");
                Err(KeelError::Internal(
                    "no trading engine wired for emergency shutdown".to_string(),
                ))
            }
        };

        let _ = self.event_tx.send(FailoverEvent::EmergencyShutdown {
            reason: reason.to_string(),
            manual,
        });

        if let Err(ref e) = result {
            // Engine failures are reported, never rethrown into the monitor loop.
            error!("Trading engine shutdown failed: {}", e);
            let _ = self.event_tx.send(FailoverEvent::EmergencyShutdownFailed {
                reason: reason.to_string(),
                error: e.to_string(),
            });
        }

        self.publisher.refresh().await;
        result
    }

    fn disarm(&self) {
        if self.engaged.swap(false, Ordering::SeqCst) {
            info!("Emergency latch disarmed; state left emergency");
        }
    }
}
