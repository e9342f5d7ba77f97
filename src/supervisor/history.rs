//! Bounded audit log of recovery attempts.

use crate::domain::ComponentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Outcome of one recovery attempt, immutable once appended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryRecord {
    pub timestamp: DateTime<Utc>,
    pub component: String,
    /// Status the component degraded to before recovery started
    pub status_at_attempt: ComponentStatus,
    pub attempt: u32,
    pub success: bool,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Append-only log of recovery attempts with a fixed retention count.
///
/// Insertion order is chronological order; once full, the oldest entry is
/// dropped first.
pub struct RecoveryHistory {
    entries: RwLock<VecDeque<RecoveryRecord>>,
    retention: RwLock<usize>,
}

impl RecoveryHistory {
    pub fn new(retention: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(retention.min(1024))),
            retention: RwLock::new(retention.max(1)),
        }
    }

    pub async fn append(&self, record: RecoveryRecord) {
        let retention = *self.retention.read().await;
        let mut entries = self.entries.write().await;
        while entries.len() >= retention {
            entries.pop_front();
        }
        entries.push_back(record);
    }

    /// Chronological snapshot, oldest first
    pub async fn snapshot(&self) -> Vec<RecoveryRecord> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Change the retention count, trimming the oldest entries if needed
    pub async fn set_retention(&self, retention: usize) {
        let retention = retention.max(1);
        *self.retention.write().await = retention;
        let mut entries = self.entries.write().await;
        while entries.len() > retention {
            entries.pop_front();
        }
    }
}
