//! Facade wiring the failover core together.
//!
//! Owns every subsystem, spawns the background tasks and exposes the
//! operations a presentation layer consumes: status, recovery history,
//! config updates, component reset and the manual emergency trigger.

use crate::config::{ConfigStore, FailoverConfig, FailoverConfigUpdate};
use crate::coordination::aggregator::StatePublisher;
use crate::coordination::emergency::EmergencyController;
use crate::domain::{ComponentRecord, FailoverState};
use crate::error::Result;
use crate::supervisor::history::{RecoveryHistory, RecoveryRecord};
use crate::supervisor::monitor::HealthMonitor;
use crate::supervisor::recovery::RecoveryManager;
use crate::supervisor::registry::ComponentRegistry;
use crate::traits::{FailoverEvent, HealthProbe, Notifier, RecoveryHook, TradingEngine};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

/// Bound on a single notifier delivery
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Snapshot served to the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: FailoverState,
    pub components: BTreeMap<String, ComponentRecord>,
    pub config: FailoverConfig,
    pub timestamp: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
}

/// Entry point for embedding the failover core in a trading bot
pub struct FailoverManager {
    config: Arc<ConfigStore>,
    registry: Arc<ComponentRegistry>,
    history: Arc<RecoveryHistory>,
    publisher: Arc<StatePublisher>,
    monitor: Arc<HealthMonitor>,
    recovery: Arc<RecoveryManager>,
    emergency: Arc<EmergencyController>,
    notifier: Option<Arc<dyn Notifier>>,
    event_tx: broadcast::Sender<FailoverEvent>,
    started_at: DateTime<Utc>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl FailoverManager {
    pub fn new(config: FailoverConfig) -> Result<Self> {
        let history_retention = config.history_retention;
        let config = Arc::new(ConfigStore::new(config)?);
        let registry = Arc::new(ComponentRegistry::new());
        let history = Arc::new(RecoveryHistory::new(history_retention));
        let (event_tx, _) = broadcast::channel(256);

        let publisher = Arc::new(StatePublisher::new(
            Arc::clone(&registry),
            Arc::clone(&config),
            event_tx.clone(),
        ));
        let recovery = RecoveryManager::new(
            Arc::clone(&registry),
            Arc::clone(&config),
            Arc::clone(&history),
            Arc::clone(&publisher),
            event_tx.clone(),
        );
        let monitor = HealthMonitor::new(
            Arc::clone(&registry),
            Arc::clone(&config),
            Arc::clone(&recovery),
            Arc::clone(&publisher),
            event_tx.clone(),
        );
        let emergency = EmergencyController::new(
            Arc::clone(&config),
            Arc::clone(&recovery),
            Arc::clone(&publisher),
            event_tx.clone(),
        );

        Ok(Self {
            config,
            registry,
            history,
            publisher,
            monitor,
            recovery,
            emergency,
            notifier: None,
            event_tx,
            started_at: Utc::now(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        // Default configuration always passes validation.
        Self::new(FailoverConfig::default()).expect("default configuration is valid")
    }

    /// Wire the trading engine used for emergency shutdown
    pub fn with_engine(self, engine: Arc<dyn TradingEngine>) -> Self {
        self.emergency.set_engine(engine);
        self
    }

    /// Wire the notifier that receives failover events
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Register a component with its probe and optional recovery action.
    ///
    /// Without a recovery hook the component still escalates status and
    /// feeds the aggregated state, but is never auto-recovered.
    pub async fn register_component(
        &self,
        name: &str,
        critical: bool,
        probe: Arc<dyn HealthProbe>,
        recovery_hook: Option<Arc<dyn RecoveryHook>>,
    ) {
        self.registry.register(name, critical).await;
        self.monitor.register_probe(name, probe).await;
        if let Some(hook) = recovery_hook {
            self.recovery.register_hook(name, hook).await;
        }
    }

    /// Spawn the monitor loop, emergency watcher and notifier forwarder
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            warn!("Failover manager already started");
            return;
        }

        tasks.push(self.monitor.start());
        tasks.push(self.emergency.start(self.publisher.subscribe()));

        if let Some(notifier) = self.notifier.clone() {
            let mut event_rx = self.event_tx.subscribe();
            let config = Arc::clone(&self.config);
            tasks.push(tokio::spawn(async move {
                loop {
                    match event_rx.recv().await {
                        Ok(event) => {
                            if !config.get().await.notification_enabled {
                                continue;
                            }
                            let delivery = tokio::time::timeout(
                                NOTIFY_TIMEOUT,
                                notifier.notify(&event),
                            )
                            .await;
                            match delivery {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => warn!("Notifier delivery failed: {}", e),
                                Err(_) => warn!("Notifier delivery timed out"),
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!("Notifier lagged, {} events dropped", missed);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }

        info!("Failover manager started");
    }

    /// Halt background tasks and pending recovery timers
    pub async fn stop(&self) {
        self.monitor.stop();
        self.recovery.abort_all().await;
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("Failover manager stopped");
    }

    /// Current aggregated failover state
    pub fn state(&self) -> FailoverState {
        self.publisher.current()
    }

    /// Subscribe to failover events
    pub fn subscribe(&self) -> broadcast::Receiver<FailoverEvent> {
        self.event_tx.subscribe()
    }

    /// Force an immediate monitor cycle (presentation "check now")
    pub async fn check_now(&self) {
        self.monitor.run_cycle().await;
    }

    /// Full status snapshot for the presentation layer
    pub async fn status(&self) -> StatusReport {
        let now = Utc::now();
        let components = self
            .registry
            .list()
            .await
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();

        StatusReport {
            state: self.publisher.current(),
            components,
            config: self.config.get().await,
            timestamp: now,
            started_at: self.started_at,
            uptime_seconds: (now - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Recovery history in chronological order
    pub async fn recovery_history(&self) -> Vec<RecoveryRecord> {
        self.history.snapshot().await
    }

    /// Apply a validated, all-or-nothing configuration update
    pub async fn update_config(&self, update: FailoverConfigUpdate) -> Result<FailoverConfig> {
        let applied = self.config.update(update).await?;
        self.history.set_retention(applied.history_retention).await;
        // The enabled flag and attempt limits feed directly into the state.
        self.publisher.refresh().await;
        Ok(applied)
    }

    /// Manual reset: clear counters, cancel pending recovery, set healthy.
    ///
    /// Idempotent; fails with `UnknownComponent` for unregistered names.
    pub async fn reset_component(&self, name: &str) -> Result<()> {
        // Cancel first so a sleeping attempt can never fire against the
        // record we are about to clear.
        self.recovery.cancel(name).await;
        self.registry.reset(name).await?;
        self.publisher.refresh().await;
        Ok(())
    }

    /// Manual emergency shutdown, independent of component state
    pub async fn trigger_emergency_shutdown(&self, reason: &str) -> Result<()> {
        self.emergency.trigger_manual(reason).await
    }

    /// Operator confirmation that the emergency has been handled; re-enables
    /// automatic recovery
    pub fn acknowledge_emergency(&self) {
        self.recovery.clear_lockout();
        info!("Emergency acknowledged by operator");
    }
}
