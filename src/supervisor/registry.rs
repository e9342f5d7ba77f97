//! Registry of monitored components.

use crate::domain::ComponentRecord;
use crate::error::{KeelError, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Holds the current record for every monitored component.
///
/// The store lock serializes all mutations, so monitor and recovery updates
/// to a record never interleave partially; readers get cloned snapshots.
pub struct ComponentRegistry {
    components: RwLock<HashMap<String, ComponentRecord>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
        }
    }

    /// Register a component for monitoring. Re-registering an existing name
    /// keeps its counters and only refreshes the critical flag.
    pub async fn register(&self, name: &str, critical: bool) {
        let mut components = self.components.write().await;
        match components.get_mut(name) {
            Some(record) => {
                record.critical = critical;
                debug!("Component {} re-registered (critical: {})", name, critical);
            }
            None => {
                components.insert(name.to_string(), ComponentRecord::new(name, critical));
                info!("Registered component {} (critical: {})", name, critical);
            }
        }
    }

    pub async fn get(&self, name: &str) -> Result<ComponentRecord> {
        let components = self.components.read().await;
        components
            .get(name)
            .cloned()
            .ok_or_else(|| KeelError::UnknownComponent(name.to_string()))
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.components.read().await.contains_key(name)
    }

    /// Atomic read-modify-write of a single record
    pub async fn update<F>(&self, name: &str, mutator: F) -> Result<ComponentRecord>
    where
        F: FnOnce(&mut ComponentRecord),
    {
        let mut components = self.components.write().await;
        let record = components
            .get_mut(name)
            .ok_or_else(|| KeelError::UnknownComponent(name.to_string()))?;
        mutator(record);
        Ok(record.clone())
    }

    /// Snapshot of all records, ordered by name for stable output
    pub async fn list(&self) -> Vec<ComponentRecord> {
        let components = self.components.read().await;
        let mut records: Vec<_> = components.values().cloned().collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    /// Clear counters and set the component healthy
    pub async fn reset(&self, name: &str) -> Result<ComponentRecord> {
        let record = self.update(name, |r| r.mark_healthy()).await?;
        info!("Component {} reset to healthy", name);
        Ok(record)
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ComponentStatus;

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = ComponentRegistry::new();
        registry.register("market_data", true).await;

        let record = registry.get("market_data").await.unwrap();
        assert_eq!(record.name, "market_data");
        assert!(record.critical);
        assert_eq!(record.status, ComponentStatus::Healthy);
        assert!(record.last_check.is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_component() {
        let registry = ComponentRegistry::new();
        let err = registry.get("ghost").await.unwrap_err();
        assert!(matches!(err, KeelError::UnknownComponent(_)));
    }

    #[tokio::test]
    async fn test_reregister_keeps_counters() {
        let registry = ComponentRegistry::new();
        registry.register("persistence", false).await;
        registry
            .update("persistence", |r| r.failure_count = 2)
            .await
            .unwrap();

        registry.register("persistence", true).await;

        let record = registry.get("persistence").await.unwrap();
        assert!(record.critical);
        assert_eq!(record.failure_count, 2);
    }

    #[tokio::test]
    async fn test_update_is_atomic() {
        let registry = ComponentRegistry::new();
        registry.register("order_execution", true).await;

        let updated = registry
            .update("order_execution", |r| {
                r.failure_count += 1;
                r.status = ComponentStatus::Warning;
            })
            .await
            .unwrap();

        assert_eq!(updated.failure_count, 1);
        assert_eq!(updated.status, ComponentStatus::Warning);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let registry = ComponentRegistry::new();
        registry.register("account_feed", false).await;
        registry
            .update("account_feed", |r| {
                r.status = ComponentStatus::Failed;
                r.failure_count = 6;
                r.recovery_attempts = 2;
            })
            .await
            .unwrap();

        let first = registry.reset("account_feed").await.unwrap();
        assert_eq!(first.status, ComponentStatus::Healthy);
        assert_eq!(first.failure_count, 0);

        let second = registry.reset("account_feed").await.unwrap();
        assert_eq!(second.status, ComponentStatus::Healthy);
        assert_eq!(second.recovery_attempts, 0);
    }

    #[tokio::test]
    async fn test_reset_unknown_component() {
        let registry = ComponentRegistry::new();
        assert!(matches!(
            registry.reset("ghost").await.unwrap_err(),
            KeelError::UnknownComponent(_)
        ));
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let registry = ComponentRegistry::new();
        registry.register("persistence", false).await;
        registry.register("market_data", true).await;

        let names: Vec<String> = registry.list().await.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["market_data", "persistence"]);
    }
}
