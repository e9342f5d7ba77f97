use crate::domain::EscalationPolicy;
use crate::error::{KeelError, Result};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

/// Failover configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Master switch for failover monitoring
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Automatically schedule recovery for degraded components
    #[serde(default = "default_true")]
    pub auto_recovery: bool,
    /// Allow the emergency controller to halt trading on its own
    #[serde(default = "default_true")]
    pub emergency_shutdown_enabled: bool,
    /// Forward failover events to the notifier
    #[serde(default = "default_true")]
    pub notification_enabled: bool,
    /// Recovery attempts per component before giving up (1-10)
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,
    /// Base delay between recovery attempts in seconds (10-300)
    #[serde(default = "default_recovery_backoff_secs")]
    pub recovery_backoff_secs: u64,
    /// Cap on the exponential backoff delay in seconds
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Interval between monitor cycles in seconds (1-300)
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    /// Timeout for a single probe invocation in seconds (1-60)
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Timeout for a single recovery action in seconds (1-300)
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
    /// Timeout for the trading engine shutdown call in seconds (1-300)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
    /// Recovery records retained in the audit log (10-10000)
    #[serde(default = "default_history_retention")]
    pub history_retention: usize,
    /// Failure-count thresholds for status escalation
    #[serde(default)]
    pub escalation: EscalationPolicy,
}

fn default_true() -> bool {
    true
}

fn default_max_recovery_attempts() -> u32 {
    3
}

fn default_recovery_backoff_secs() -> u64 {
    30
}

fn default_max_backoff_secs() -> u64 {
    600
}

fn default_check_interval_secs() -> u64 {
    10
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_recovery_timeout_secs() -> u64 {
    30
}

fn default_shutdown_timeout_secs() -> u64 {
    60
}

fn default_history_retention() -> usize {
    100
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_recovery: true,
            emergency_shutdown_enabled: true,
            notification_enabled: true,
            max_recovery_attempts: default_max_recovery_attempts(),
            recovery_backoff_secs: default_recovery_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            check_interval_secs: default_check_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            history_retention: default_history_retention(),
            escalation: EscalationPolicy::default(),
        }
    }
}

impl FailoverConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("KEEL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (KEEL_MAX_RECOVERY_ATTEMPTS, etc.)
            .add_source(
                Environment::with_prefix("KEEL")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    ///
    /// Every message names the offending field so rejections can be
    /// reported back to the caller verbatim.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(1..=10).contains(&self.max_recovery_attempts) {
            errors.push("max_recovery_attempts must be between 1 and 10".to_string());
        }

        if !(10..=300).contains(&self.recovery_backoff_secs) {
            errors.push("recovery_backoff_secs must be between 10 and 300".to_string());
        }

        if self.max_backoff_secs < self.recovery_backoff_secs || self.max_backoff_secs > 3600 {
            errors.push(
                "max_backoff_secs must be between recovery_backoff_secs and 3600".to_string(),
            );
        }

        if !(1..=300).contains(&self.check_interval_secs) {
            errors.push("check_interval_secs must be between 1 and 300".to_string());
        }

        if !(1..=60).contains(&self.probe_timeout_secs) {
            errors.push("probe_timeout_secs must be between 1 and 60".to_string());
        }

        if !(1..=300).contains(&self.recovery_timeout_secs) {
            errors.push("recovery_timeout_secs must be between 1 and 300".to_string());
        }

        if !(1..=300).contains(&self.shutdown_timeout_secs) {
            errors.push("shutdown_timeout_secs must be between 1 and 300".to_string());
        }

        if !(10..=10_000).contains(&self.history_retention) {
            errors.push("history_retention must be between 10 and 10000".to_string());
        }

        if let Err(e) = self.escalation.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Partial update applied atomically to the failover configuration.
///
/// Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FailoverConfigUpdate {
    pub enabled: Option<bool>,
    pub auto_recovery: Option<bool>,
    pub emergency_shutdown_enabled: Option<bool>,
    pub notification_enabled: Option<bool>,
    pub max_recovery_attempts: Option<u32>,
    pub recovery_backoff_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
    pub check_interval_secs: Option<u64>,
    pub probe_timeout_secs: Option<u64>,
    pub recovery_timeout_secs: Option<u64>,
    pub shutdown_timeout_secs: Option<u64>,
    pub history_retention: Option<usize>,
    pub escalation: Option<EscalationPolicy>,
}

impl FailoverConfigUpdate {
    fn apply_to(&self, config: &mut FailoverConfig) {
        if let Some(v) = self.enabled {
            config.enabled = v;
        }
        if let Some(v) = self.auto_recovery {
            config.auto_recovery = v;
        }
        if let Some(v) = self.emergency_shutdown_enabled {
            config.emergency_shutdown_enabled = v;
        }
        if let Some(v) = self.notification_enabled {
            config.notification_enabled = v;
        }
        if let Some(v) = self.max_recovery_attempts {
            config.max_recovery_attempts = v;
        }
        if let Some(v) = self.recovery_backoff_secs {
            config.recovery_backoff_secs = v;
        }
        if let Some(v) = self.max_backoff_secs {
            config.max_backoff_secs = v;
        }
        if let Some(v) = self.check_interval_secs {
            config.check_interval_secs = v;
        }
        if let Some(v) = self.probe_timeout_secs {
            config.probe_timeout_secs = v;
        }
        if let Some(v) = self.recovery_timeout_secs {
            config.recovery_timeout_secs = v;
        }
        if let Some(v) = self.shutdown_timeout_secs {
            config.shutdown_timeout_secs = v;
        }
        if let Some(v) = self.history_retention {
            config.history_retention = v;
        }
        if let Some(v) = self.escalation {
            config.escalation = v;
        }
    }
}

/// Owns the live configuration; every other component reads through here
/// and all mutation goes through validated all-or-nothing updates.
pub struct ConfigStore {
    inner: RwLock<FailoverConfig>,
}

impl ConfigStore {
    pub fn new(config: FailoverConfig) -> Result<Self> {
        if let Err(errors) = config.validate() {
            return Err(KeelError::InvalidConfig(errors.join("; ")));
        }
        Ok(Self {
            inner: RwLock::new(config),
        })
    }

    /// Snapshot of the current configuration
    pub async fn get(&self) -> FailoverConfig {
        self.inner.read().await.clone()
    }

    /// Apply a partial update.
    ///
    /// The merged result is validated before anything is written; a single
    /// invalid field rejects the whole update and the prior configuration
    /// stays in place.
    pub async fn update(&self, update: FailoverConfigUpdate) -> Result<FailoverConfig> {
        let mut guard = self.inner.write().await;
        let mut candidate = guard.clone();
        update.apply_to(&mut candidate);

        if let Err(errors) = candidate.validate() {
            return Err(KeelError::InvalidConfig(errors.join("; ")));
        }

        *guard = candidate.clone();
        info!("Failover configuration updated");
        Ok(candidate)
    }
}
