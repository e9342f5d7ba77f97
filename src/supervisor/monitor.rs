//! Periodic health monitoring loop.
//!
//! Each cycle probes every registered component in its own task with a
//! bounded timeout, applies the escalation policy to the registry, refreshes
//! the aggregated state and hands degraded components to the recovery
//! manager.

use crate::config::{ConfigStore, FailoverConfig};
use crate::coordination::aggregator::StatePublisher;
use crate::domain::{ComponentRecord, ComponentStatus};
use crate::supervisor::recovery::RecoveryManager;
use crate::supervisor::registry::ComponentRegistry;
use crate::traits::{FailoverEvent, HealthProbe, ProbeResult};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Drives probes on a fixed interval and keeps the registry current
pub struct HealthMonitor {
    registry: Arc<ComponentRegistry>,
    config: Arc<ConfigStore>,
    recovery: Arc<RecoveryManager>,
    publisher: Arc<StatePublisher>,
    probes: RwLock<HashMap<String, Arc<dyn HealthProbe>>>,
    event_tx: broadcast::Sender<FailoverEvent>,
    running: Arc<AtomicBool>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        config: Arc<ConfigStore>,
        recovery: Arc<RecoveryManager>,
        publisher: Arc<StatePublisher>,
        event_tx: broadcast::Sender<FailoverEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            config,
            recovery,
            publisher,
            probes: RwLock::new(HashMap::new()),
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub async fn register_probe(&self, name: &str, probe: Arc<dyn HealthProbe>) {
        self.probes.write().await.insert(name.to_string(), probe);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the periodic monitor loop
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            info!("Health monitor started");
            while monitor.running.load(Ordering::SeqCst) {
                monitor.run_cycle().await;

                // Re-read the interval each cycle so config updates apply live.
                let interval = monitor.config.get().await.check_interval_secs;
                tokio::time::sleep(Duration::from_secs(interval)).await;
            }
            info!("Health monitor stopped");
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Probe every registered component once.
    ///
    /// Public so a presentation layer can force an immediate check.
    pub async fn run_cycle(&self) {
        let config = self.config.get().await;
        if !config.enabled {
            // Monitoring disabled: no probing, no failover reporting.
            self.publisher.refresh().await;
            return;
        }

        let probes: Vec<(String, Arc<dyn HealthProbe>)> = {
            let probes = self.probes.read().await;
            probes
                .iter()
                .map(|(name, probe)| (name.clone(), Arc::clone(probe)))
                .collect()
        };
        if probes.is_empty() {
            return;
        }

        let timeout = Duration::from_secs(config.probe_timeout_secs);

        // One task per probe so a slow component never delays the others.
        let checks: Vec<_> = probes
            .into_iter()
            .map(|(name, probe)| {
                tokio::spawn(async move {
                    let result = match tokio::time::timeout(timeout, probe.check()).await {
                        Ok(result) => result,
                        Err(_) => ProbeResult::Fail(format!(
                            "probe timed out after {}s",
                            timeout.as_secs()
                        )),
                    };
                    (name, result)
                })
            })
            .collect();

        let mut to_recover = Vec::new();
        for joined in futures::future::join_all(checks).await {
            let Ok((name, result)) = joined else { continue };
            if let Some(record) = self.apply_probe_result(&name, result, &config).await {
                if record.status.needs_recovery() {
                    to_recover.push(record);
                }
            }
        }

        self.publisher.refresh().await;

        for record in to_recover {
            self.recovery.trigger(&record).await;
        }
    }

    async fn apply_probe_result(
        &self,
        name: &str,
        result: ProbeResult,
        config: &FailoverConfig,
    ) -> Option<ComponentRecord> {
        let now = Utc::now();
        match result {
            ProbeResult::Pass => {
                // Cancel before touching the record so the result of an
                // in-flight recovery attempt cannot clobber the fresh reading.
                self.recovery.cancel(name).await;

                let mut previous = None;
                let record = self
                    .registry
                    .update(name, |r| {
                        previous = Some(r.status);
                        r.last_check = Some(now);
                        if !r.status.is_healthy() {
                            r.mark_healthy();
                        }
                    })
                    .await
                    .ok()?;

                if let Some(previous) = previous {
                    if !previous.is_healthy() {
                        info!("Component {} recovered (probe pass after {})", name, previous);
                        let _ = self.event_tx.send(FailoverEvent::ComponentRecovered {
                            component: name.to_string(),
                        });
                    }
                }
                Some(record)
            }
            ProbeResult::Degraded(reason) | ProbeResult::Fail(reason) => {
                let mut previous = None;
                let record = self
                    .registry
                    .update(name, |r| {
                        previous = Some(r.status);
                        r.last_check = Some(now);
                        r.failure_count += 1;
                        r.last_error = Some(reason.clone());
                        // The recovery manager owns the status while an
                        // attempt cycle is active.
                        if r.status != ComponentStatus::Recovering {
                            r.status = config.escalation.status_for(r.failure_count);
                        }
                    })
                    .await
                    .ok()?;

                match previous {
                    Some(previous) if previous != record.status => {
                        warn!(
                            "Component {} degraded: {} -> {} ({} consecutive failures: {})",
                            name, previous, record.status, record.failure_count, reason
                        );
                        let _ = self.event_tx.send(FailoverEvent::StatusChanged {
                            component: name.to_string(),
                            from: previous,
                            to: record.status,
                        });
                    }
                    _ => {
                        debug!(
                            "Component {} probe failed ({} consecutive): {}",
                            name, record.failure_count, reason
                        );
                    }
                }
                Some(record)
            }
        }
    }
}
