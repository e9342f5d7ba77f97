//! End-to-end scenarios driving the failover manager through its public
//! interface with scripted probes and recovery hooks.

use async_trait::async_trait;
use keel::{
    FailoverConfig, FailoverConfigUpdate, FailoverEvent, FailoverManager, HealthProbe, Notifier,
    ProbeResult, RecoveryHook, Result, TradingEngine,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Probe that replays a fixed script, then keeps passing
struct ScriptedProbe {
    script: Mutex<VecDeque<ProbeResult>>,
}

impl ScriptedProbe {
    fn new(results: Vec<ProbeResult>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(results.into()),
        })
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn check(&self) -> ProbeResult {
        let mut script = match self.script.lock() {
            Ok(script) => script,
            Err(_) => return ProbeResult::Fail("poisoned".into()),
        };
        script.pop_front().unwrap_or(ProbeResult::Pass)
    }
}

/// Probe that fails forever
struct FailingProbe;

#[async_trait]
impl HealthProbe for FailingProbe {
    async fn check(&self) -> ProbeResult {
        ProbeResult::Fail("connection refused".into())
    }
}

/// Recovery hook that always fails
struct FailingHook {
    calls: AtomicU32,
}

impl FailingHook {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecoveryHook for FailingHook {
    async fn recover(&self) -> std::result::Result<(), String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err("still unreachable".to_string())
    }
}

/// Trading engine that counts shutdown invocations
struct RecordingEngine {
    calls: AtomicU32,
}

impl RecordingEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TradingEngine for RecordingEngine {
    async fn shutdown(&self, _reason: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Notifier that records every delivered event
struct RecordingNotifier {
    events: Mutex<Vec<FailoverEvent>>,
}

impl RecordingNotifier {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn emergency_count(&self) -> usize {
        self.events
            .lock()
            .map(|events| {
                events
                    .iter()
                    .filter(|e| matches!(e, FailoverEvent::EmergencyShutdown { .. }))
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &FailoverEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }
}

fn test_config() -> FailoverConfig {
    FailoverConfig {
        max_recovery_attempts: 3,
        recovery_backoff_secs: 10,
        max_backoff_secs: 120,
        check_interval_secs: 5,
        probe_timeout_secs: 2,
        recovery_timeout_secs: 5,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn critical_component_exhaustion_triggers_emergency_shutdown_once() {
    let manager = FailoverManager::new(test_config()).unwrap();
    let engine = RecordingEngine::new();
    let notifier = RecordingNotifier::new();
    let hook = FailingHook::new();
    let manager = manager
        .with_engine(engine.clone())
        .with_notifier(notifier.clone());

    manager
        .register_component(
            "market_data",
            true,
            Arc::new(FailingProbe),
            Some(hook.clone()),
        )
        .await;
    manager.start().await;

    // Enough virtual time for five failed probes, three failed recovery
    // attempts and the emergency transition.
    tokio::time::sleep(Duration::from_secs(600)).await;

    let status = manager.status().await;
    assert_eq!(status.state.to_string(), "emergency");
    let record = &status.components["market_data"];
    assert_eq!(record.status.to_string(), "failed");
    assert_eq!(record.recovery_attempts, 3);
    assert!(record.failure_count >= 5);

    // Exactly one shutdown call even though the state keeps re-aggregating.
    assert_eq!(engine.calls(), 1);
    assert_eq!(hook.calls(), 3);

    let history = manager.recovery_history().await;
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|r| !r.success));
    assert!(history.iter().all(|r| r.component == "market_data"));
    let attempts: Vec<u32> = history.iter().map(|r| r.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);

    // More cycles in emergency must not refire the shutdown.
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(engine.calls(), 1);
    assert_eq!(notifier.emergency_count(), 1);

    manager.stop().await;
}

#[tokio::test(start_paused = true)]
async fn noncritical_warning_degrades_then_recovers_to_normal() {
    let manager = FailoverManager::new(test_config()).unwrap();

    manager
        .register_component(
            "notifier_channel",
            false,
            ScriptedProbe::new(vec![
                ProbeResult::Fail("webhook 503".into()),
                ProbeResult::Fail("webhook 503".into()),
            ]),
            None,
        )
        .await;

    manager.check_now().await;
    manager.check_now().await;

    let status = manager.status().await;
    assert_eq!(status.state.to_string(), "degraded");
    assert_eq!(
        status.components["notifier_channel"].status.to_string(),
        "warning"
    );
    assert_eq!(status.components["notifier_channel"].failure_count, 2);

    // Third probe succeeds: counters clear and the system is normal again.
    manager.check_now().await;

    let status = manager.status().await;
    assert_eq!(status.state.to_string(), "normal");
    assert_eq!(
        status.components["notifier_channel"].status.to_string(),
        "healthy"
    );
    assert_eq!(status.components["notifier_channel"].failure_count, 0);
    assert_eq!(status.components["notifier_channel"].recovery_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn manual_reset_cancels_pending_recovery_without_history() {
    let manager = FailoverManager::new(test_config()).unwrap();
    let hook = FailingHook::new();

    manager
        .register_component(
            "market_data",
            true,
            ScriptedProbe::new(vec![ProbeResult::Fail("stale feed".into())]),
            Some(hook.clone()),
        )
        .await;

    // One failed probe schedules a backoff-delayed recovery attempt.
    manager.check_now().await;
    let status = manager.status().await;
    assert_eq!(
        status.components["market_data"].status.to_string(),
        "recovering"
    );
    assert_eq!(status.state.to_string(), "recovery");

    // Reset while the attempt is still pending.
    manager.reset_component("market_data").await.unwrap();

    let status = manager.status().await;
    assert_eq!(
        status.components["market_data"].status.to_string(),
        "healthy"
    );
    assert_eq!(status.state.to_string(), "normal");

    // The pending attempt never executes and leaves no audit entry.
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(hook.calls(), 0);
    assert!(manager.recovery_history().await.is_empty());

    // Reset is idempotent.
    manager.reset_component("market_data").await.unwrap();
    let status = manager.status().await;
    assert_eq!(
        status.components["market_data"].status.to_string(),
        "healthy"
    );
}

#[tokio::test(start_paused = true)]
async fn manual_emergency_shutdown_bypasses_escalation() {
    let manager = FailoverManager::new(test_config()).unwrap();
    let engine = RecordingEngine::new();
    let manager = manager.with_engine(engine.clone());

    manager
        .register_component(
            "market_data",
            true,
            ScriptedProbe::new(vec![]),
            None,
        )
        .await;
    manager.check_now().await;
    assert_eq!(manager.status().await.state.to_string(), "normal");

    // All components healthy, yet the manual trigger must fire immediately.
    manager
        .trigger_emergency_shutdown("operator drill")
        .await
        .unwrap();
    assert_eq!(engine.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_config_update_changes_nothing() {
    let manager = FailoverManager::new(test_config()).unwrap();
    let before = manager.status().await.config;

    let err = manager
        .update_config(FailoverConfigUpdate {
            auto_recovery: Some(false),
            max_recovery_attempts: Some(0), // out of range
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("max_recovery_attempts"));

    let after = manager.status().await.config;
    assert_eq!(after.auto_recovery, before.auto_recovery);
    assert_eq!(after.max_recovery_attempts, before.max_recovery_attempts);
}

#[tokio::test(start_paused = true)]
async fn history_is_bounded_by_retention() {
    let mut config = test_config();
    config.history_retention = 10;
    let manager = FailoverManager::new(config).unwrap();
    let hook = FailingHook::new();

    manager
        .register_component(
            "persistence",
            false,
            Arc::new(FailingProbe),
            Some(hook.clone()),
        )
        .await;
    manager.start().await;

    // Four exhaustion rounds of three attempts each; the reset between
    // rounds re-arms automatic recovery.
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_secs(600)).await;
        manager.reset_component("persistence").await.unwrap();
    }
    manager.stop().await;

    assert_eq!(hook.calls(), 12);
    let history = manager.recovery_history().await;
    assert_eq!(history.len(), 10);
    // Chronological order is preserved and the oldest entries were dropped.
    for window in history.windows(2) {
        assert!(window[0].timestamp <= window[1].timestamp);
    }
    assert_eq!(history.last().unwrap().attempt, 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_noncritical_component_does_not_escalate_to_emergency() {
    let manager = FailoverManager::new(test_config()).unwrap();
    let engine = RecordingEngine::new();
    let hook = FailingHook::new();
    let manager = manager.with_engine(engine.clone());

    manager
        .register_component(
            "account_feed",
            false,
            Arc::new(FailingProbe),
            Some(hook.clone()),
        )
        .await;
    manager.start().await;

    tokio::time::sleep(Duration::from_secs(600)).await;

    let status = manager.status().await;
    // A non-critical component can exhaust recovery without an emergency.
    assert_eq!(hook.calls(), 3);
    assert_ne!(status.state.to_string(), "emergency");
    assert_eq!(engine.calls(), 0);

    manager.stop().await;
}
