//! Per-entity interaction counter and the global extraction threshold.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::storage::kv_store::KeyValueStore;

const THRESHOLD_KEY: &str = "settings:interaction_threshold";

fn counter_key(entity_id: &str) -> String {
    format!("counter:{entity_id}")
}

/// Counts interactions per entity and reports when the threshold is reached.
///
/// Increments for the same entity are serialized so concurrent callers never
/// lose a count; different entities proceed independently.
pub struct InteractionCounter {
    kv: Arc<dyn KeyValueStore>,
    default_threshold: u64,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl InteractionCounter {
    /// Create a counter backed by `kv`.
    ///
    /// `default_threshold` applies until an operator stores another one.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>, default_threshold: u64) -> Self {
        Self {
            kv,
            default_threshold,
            locks: DashMap::new(),
        }
    }

    /// Current threshold.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn threshold(&self) -> MemoryResult<u64> {
        let Some(raw) = self.kv.get(THRESHOLD_KEY).await? else {
            return Ok(self.default_threshold);
        };
        match raw.parse::<u64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => {
                warn!(value = %raw, "Ignoring unusable stored threshold");
                Ok(self.default_threshold)
            }
        }
    }

    /// Store a new threshold, read by every later increment.
    ///
    /// # Errors
    /// Returns an error if `threshold` is zero or storage access fails.
    pub async fn set_threshold(&self, threshold: u64) -> MemoryResult<()> {
        if threshold == 0 {
            return Err(MemoryError::InvalidConfig(
                "threshold must be at least 1".to_string(),
            ));
        }
        self.kv.set(THRESHOLD_KEY, threshold.to_string()).await
    }

    /// Interactions counted since the last trigger.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn count(&self, entity_id: &str) -> MemoryResult<u64> {
        let raw = self.kv.get(&counter_key(entity_id)).await?;
        Ok(parse_count(entity_id, raw.as_deref()))
    }

    /// Count one interaction.
    ///
    /// Returns `true` exactly when the new count reaches the threshold; the
    /// counter is then reset to zero.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn increment(&self, entity_id: &str) -> MemoryResult<bool> {
        let lock = self.entity_lock(entity_id);
        let _guard = lock.lock().await;

        let key = counter_key(entity_id);
        let current = parse_count(entity_id, self.kv.get(&key).await?.as_deref());
        let next = current.saturating_add(1);
        let threshold = self.threshold().await?;

        if next >= threshold {
            self.kv.set(&key, "0".to_string()).await?;
            debug!(entity_id, count = next, threshold, "Interaction threshold reached");
            Ok(true)
        } else {
            self.kv.set(&key, next.to_string()).await?;
            Ok(false)
        }
    }

    /// Reset an entity's counter to zero.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn reset(&self, entity_id: &str) -> MemoryResult<()> {
        let lock = self.entity_lock(entity_id);
        let _guard = lock.lock().await;
        self.kv.remove(&counter_key(entity_id)).await
    }

    fn entity_lock(&self, entity_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(entity_id.to_string())
            .or_default()
            .value()
            .clone()
    }
}

fn parse_count(entity_id: &str, raw: Option<&str>) -> u64 {
    let Some(raw) = raw else {
        return 0;
    };
    raw.parse().unwrap_or_else(|_| {
        warn!(entity_id, value = raw, "Corrupt interaction counter, restarting at zero");
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::storage::kv_store::InMemoryKvStore;

    fn counter(threshold: u64) -> InteractionCounter {
        InteractionCounter::new(Arc::new(InMemoryKvStore::new()), threshold)
    }

    #[tokio::test]
    async fn test_triggers_exactly_on_threshold() {
        let counter = counter(3);
        assert!(!counter.increment("alice").await.unwrap());
        assert!(!counter.increment("alice").await.unwrap());
        assert!(counter.increment("alice").await.unwrap());
        assert_eq!(counter.count("alice").await.unwrap(), 0);
        assert!(!counter.increment("alice").await.unwrap());
        assert_eq!(counter.count("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_entities_are_independent() {
        let counter = counter(2);
        counter.increment("alice").await.unwrap();
        assert!(!counter.increment("bob").await.unwrap());
        assert!(counter.increment("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_threshold_of_one_triggers_every_time() {
        let counter = counter(1);
        for _ in 0..3 {
            assert!(counter.increment("alice").await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_lowered_threshold_triggers_on_next_increment() {
        let counter = counter(15);
        for _ in 0..5 {
            counter.increment("alice").await.unwrap();
        }
        counter.set_threshold(3).await.unwrap();
        assert_eq!(counter.threshold().await.unwrap(), 3);
        assert!(counter.increment("alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_threshold_rejected() {
        let counter = counter(15);
        assert!(counter.set_threshold(0).await.is_err());
        assert_eq!(counter.threshold().await.unwrap(), 15);
    }

    #[tokio::test]
    async fn test_corrupt_counter_restarts() {
        let kv = Arc::new(InMemoryKvStore::new());
        kv.set("counter:alice", "many".to_string()).await.unwrap();
        let counter = InteractionCounter::new(kv, 5);
        assert_eq!(counter.count("alice").await.unwrap(), 0);
        counter.increment("alice").await.unwrap();
        assert_eq!(counter.count("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments_trigger_once() {
        let counter = Arc::new(counter(20));
        let mut handles = Vec::new();
        for _ in 0..20 {
            let counter = Arc::clone(&counter);
            handles.push(tokio::spawn(async move {
                counter.increment("alice").await.unwrap()
            }));
        }
        let mut triggers = 0;
        for handle in handles {
            if handle.await.unwrap() {
                triggers += 1;
            }
        }
        assert_eq!(triggers, 1);
        assert_eq!(counter.count("alice").await.unwrap(), 0);
    }
}
