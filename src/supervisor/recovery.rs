//! Automatic recovery with exponential backoff.
//!
//! Each degraded component gets at most one scheduled recovery attempt at a
//! time, armed as a cancellable delayed task. Cancellation (manual reset or
//! a fresh probe success) wins every race against a scheduled attempt: a
//! still-sleeping attempt never executes, and the result of an attempt
//! already in flight is recorded to history but ignored for status.

use crate::config::{ConfigStore, FailoverConfig};
use crate::coordination::aggregator::StatePublisher;
use crate::domain::{ComponentRecord, ComponentStatus};
use crate::supervisor::history::{RecoveryHistory, RecoveryRecord};
use crate::supervisor::registry::ComponentRegistry;
use crate::traits::{FailoverEvent, RecoveryHook};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// One scheduled recovery attempt for one component
struct PendingRecovery {
    generation: u64,
    /// Status the component held before recovery started; restored when
    /// automatic retries are exhausted
    prior_status: ComponentStatus,
    /// Set once the attempt has woken up and claimed its slot
    executing: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

/// Delay before a given 1-based attempt number, capped at the configured
/// maximum. The exponent is the attempt count before increment.
fn backoff_delay(config: &FailoverConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let secs = config
        .recovery_backoff_secs
        .saturating_mul(1u64 << exponent);
    Duration::from_secs(secs.min(config.max_backoff_secs))
}

/// Schedules and runs recovery attempts for degraded components
pub struct RecoveryManager {
    registry: Arc<ComponentRegistry>,
    config: Arc<ConfigStore>,
    history: Arc<RecoveryHistory>,
    publisher: Arc<StatePublisher>,
    hooks: RwLock<HashMap<String, Arc<dyn RecoveryHook>>>,
    pending: Mutex<HashMap<String, PendingRecovery>>,
    generation: AtomicU64,
    /// Engaged by the emergency controller; no attempt starts while set
    lockout: AtomicBool,
    event_tx: broadcast::Sender<FailoverEvent>,
}

impl RecoveryManager {
    pub fn new(
        registry: Arc<ComponentRegistry>,
        config: Arc<ConfigStore>,
        history: Arc<RecoveryHistory>,
        publisher: Arc<StatePublisher>,
        event_tx: broadcast::Sender<FailoverEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            config,
            history,
            publisher,
            hooks: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            lockout: AtomicBool::new(false),
            event_tx,
        })
    }

    pub async fn register_hook(&self, name: &str, hook: Arc<dyn RecoveryHook>) {
        self.hooks.write().await.insert(name.to_string(), hook);
    }

    pub fn is_locked_out(&self) -> bool {
        self.lockout.load(Ordering::SeqCst)
    }

    /// Begin recovery for a degraded component.
    ///
    /// Idempotent: a component that is already recovering, already has a
    /// scheduled attempt, or has exhausted its attempts is left alone.
    pub async fn trigger(self: &Arc<Self>, record: &ComponentRecord) {
        if self.is_locked_out() {
            debug!("Recovery locked out, skipping {}", record.name);
            return;
        }
        let config = self.config.get().await;
        if !config.auto_recovery {
            return;
        }
        if !record.status.needs_recovery() {
            return;
        }
        if record.recovery_attempts >= config.max_recovery_attempts {
            // Exhausted; only a manual reset or a fresh probe success re-arms.
            return;
        }
        if !self.hooks.read().await.contains_key(&record.name) {
            debug!("No recovery hook registered for {}", record.name);
            return;
        }

        // The pending lock is held across the claim so concurrent triggers
        // for the same component cannot double-schedule.
        let mut pending = self.pending.lock().await;
        if pending.contains_key(&record.name) {
            return;
        }

        // Claim the component: mark it recovering and take the attempt number.
        let updated = match self
            .registry
            .update(&record.name, |r| {
                r.status = ComponentStatus::Recovering;
                r.recovery_attempts += 1;
            })
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Cannot start recovery for {}: {}", record.name, e);
                return;
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let attempt = updated.recovery_attempts;
        let delay = backoff_delay(&config, attempt);
        info!(
            "Scheduling recovery attempt #{} for {} in {:?} (was {})",
            attempt, record.name, delay, record.status
        );

        let executing = Arc::new(AtomicBool::new(false));
        let handle = self.spawn_attempt(
            record.name.clone(),
            generation,
            attempt,
            delay,
            Arc::clone(&executing),
        );
        pending.insert(
            record.name.clone(),
            PendingRecovery {
                generation,
                prior_status: record.status,
                executing,
                handle,
            },
        );
        drop(pending);
        self.publisher.refresh().await;
    }

    /// Cancel the scheduled attempt for a component, if any.
    ///
    /// A still-sleeping attempt is aborted outright; an attempt that already
    /// started keeps running but its result no longer drives status.
    pub async fn cancel(&self, name: &str) -> bool {
        let mut pending = self.pending.lock().await;
        if let Some(entry) = pending.remove(name) {
            if !entry.executing.load(Ordering::SeqCst) {
                entry.handle.abort();
                debug!("Cancelled scheduled recovery for {}", name);
            } else {
                debug!("Recovery for {} already in flight; result will be discarded", name);
            }
            true
        } else {
            false
        }
    }

    /// Engage the lockout and unwind scheduled attempts.
    ///
    /// Called by the emergency controller before the shutdown sequence so no
    /// attempt starts after the shutdown invocation returns. Components with
    /// a still-sleeping attempt are restored to their pre-recovery status.
    pub async fn engage_lockout(&self) {
        self.lockout.store(true, Ordering::SeqCst);

        let drained: Vec<(String, PendingRecovery)> = {
            let mut pending = self.pending.lock().await;
            let names: Vec<String> = pending
                .iter()
                .filter(|(_, e)| !e.executing.load(Ordering::SeqCst))
                .map(|(name, _)| name.clone())
                .collect();
            names
                .into_iter()
                .filter_map(|name| pending.remove(&name).map(|e| (name, e)))
                .collect()
        };

        for (name, entry) in drained {
            entry.handle.abort();
            let prior = entry.prior_status;
            let _ = self
                .registry
                .update(&name, |r| {
                    if r.status == ComponentStatus::Recovering {
                        r.status = prior;
                    }
                })
                .await;
            warn!("Recovery for {} cancelled by emergency lockout", name);
        }
    }

    /// Release the lockout (operator acknowledgement)
    pub fn clear_lockout(&self) {
        if self.lockout.swap(false, Ordering::SeqCst) {
            info!("Recovery lockout cleared");
        }
    }

    /// Abort every scheduled attempt; used on core shutdown
    pub async fn abort_all(&self) {
        let mut pending = self.pending.lock().await;
        for (_, entry) in pending.drain() {
            entry.handle.abort();
        }
    }

    fn spawn_attempt(
        self: &Arc<Self>,
        name: String,
        generation: u64,
        attempt: u32,
        delay: Duration,
        executing: Arc<AtomicBool>,
    ) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.run_attempt(name, generation, attempt, executing).await;
        })
    }

    async fn run_attempt(
        self: Arc<Self>,
        name: String,
        generation: u64,
        attempt: u32,
        executing: Arc<AtomicBool>,
    ) {
        if self.is_locked_out() {
            // Shutdown sequence began while we slept; stand down.
            let prior = {
                let mut pending = self.pending.lock().await;
                let is_current =
                    pending.get(&name).map(|e| e.generation) == Some(generation);
                if is_current {
                    pending.remove(&name).map(|e| e.prior_status)
                } else {
                    None
                }
            };
            if let Some(prior) = prior {
                let _ = self
                    .registry
                    .update(&name, |r| {
                        if r.status == ComponentStatus::Recovering {
                            r.status = prior;
                        }
                    })
                    .await;
                self.publisher.refresh().await;
            }
            return;
        }

        // Claim the slot; a reset while we slept removed or replaced it.
        let prior_status = {
            let pending = self.pending.lock().await;
            match pending.get(&name) {
                Some(entry) if entry.generation == generation => {
                    executing.store(true, Ordering::SeqCst);
                    entry.prior_status
                }
                _ => return,
            }
        };

        let hook = self.hooks.read().await.get(&name).cloned();
        let Some(hook) = hook else {
            self.pending.lock().await.remove(&name);
            return;
        };
        let config = self.config.get().await;

        let _ = self.event_tx.send(FailoverEvent::RecoveryAttempt {
            component: name.clone(),
            attempt,
        });
        info!("Recovery attempt #{} for {}", attempt, name);

        let started = std::time::Instant::now();
        let outcome = match tokio::time::timeout(
            Duration::from_secs(config.recovery_timeout_secs),
            hook.recover(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(format!(
                "recovery timed out after {}s",
                config.recovery_timeout_secs
            )),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        // The outcome is always recorded, even when a concurrent reset means
        // it no longer drives status.
        self.history
            .append(RecoveryRecord {
                timestamp: Utc::now(),
                component: name.clone(),
                status_at_attempt: prior_status,
                attempt,
                success: outcome.is_ok(),
                duration_ms,
                error: outcome.as_ref().err().cloned(),
            })
            .await;

        let still_current = {
            let pending = self.pending.lock().await;
            pending.get(&name).map(|e| e.generation) == Some(generation)
        };
        if !still_current {
            debug!("Recovery result for {} discarded after reset", name);
            return;
        }

        match outcome {
            Ok(()) => {
                self.pending.lock().await.remove(&name);
                let _ = self.registry.update(&name, |r| r.mark_healthy()).await;
                let _ = self.event_tx.send(FailoverEvent::ComponentRecovered {
                    component: name.clone(),
                });
                info!("Component {} recovered after {} attempt(s)", name, attempt);
                self.publisher.refresh().await;
            }
            Err(error) => {
                let _ = self.event_tx.send(FailoverEvent::RecoveryFailed {
                    component: name.clone(),
                    attempt,
                    error: error.clone(),
                });
                warn!("Recovery attempt #{} for {} failed: {}", attempt, name, error);

                if attempt >= config.max_recovery_attempts {
                    self.pending.lock().await.remove(&name);
                    let _ = self
                        .registry
                        .update(&name, |r| {
                            r.status = prior_status;
                            r.last_error = Some(error);
                        })
                        .await;
                    let _ = self.event_tx.send(FailoverEvent::RecoveryExhausted {
                        component: name.clone(),
                        attempts: attempt,
                    });
                    error!(
                        "Recovery exhausted for {} after {} attempts; awaiting manual reset",
                        name, attempt
                    );
                } else if self.is_locked_out() {
                    // Shutdown sequence began while the hook ran; do not re-arm.
                    self.pending.lock().await.remove(&name);
                    let _ = self
                        .registry
                        .update(&name, |r| {
                            r.status = prior_status;
                            r.last_error = Some(error);
                        })
                        .await;
                } else {
                    // Re-arm with the next backoff step.
                    let next_attempt = match self
                        .registry
                        .update(&name, |r| {
                            r.recovery_attempts += 1;
                            r.last_error = Some(error);
                        })
                        .await
                    {
                        Ok(r) => r.recovery_attempts,
                        Err(_) => {
                            self.pending.lock().await.remove(&name);
                            return;
                        }
                    };
                    let delay = backoff_delay(&config, next_attempt);
                    debug!(
                        "Rescheduling recovery attempt #{} for {} in {:?}",
                        next_attempt, name, delay
                    );
                    let next_executing = Arc::new(AtomicBool::new(false));
                    let handle = self.spawn_attempt(
                        name.clone(),
                        generation,
                        next_attempt,
                        delay,
                        Arc::clone(&next_executing),
                    );
                    let mut pending = self.pending.lock().await;
                    match pending.get_mut(&name) {
                        Some(entry) if entry.generation == generation => {
                            entry.executing = next_executing;
                            entry.handle = handle;
                        }
                        // A reset raced the reschedule; the fresh task must not run.
                        _ => handle.abort(),
                    }
                }
                self.publisher.refresh().await;
            }
        }
    }
}
