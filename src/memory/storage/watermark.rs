//! Per-entity, per-domain watermarks.
//!
//! A watermark is the timestamp of the newest interaction already processed
//! for a domain. Stored as epoch milliseconds; it only moves forward.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::kinds::SourceDomain;
use crate::memory::storage::kv_store::KeyValueStore;

fn watermark_key(entity_id: &str, domain: SourceDomain) -> String {
    format!("watermark:{}:{entity_id}", domain.as_str())
}

/// Watermark persistence on top of a key-value store.
pub struct WatermarkStore {
    kv: Arc<dyn KeyValueStore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl WatermarkStore {
    /// Create a watermark store backed by `kv`.
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            locks: DashMap::new(),
        }
    }

    /// Last processed timestamp, or the epoch when nothing was processed yet.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn get_watermark(
        &self,
        entity_id: &str,
        domain: SourceDomain,
    ) -> MemoryResult<DateTime<Utc>> {
        let raw = self.kv.get(&watermark_key(entity_id, domain)).await?;
        Ok(decode(entity_id, domain, raw.as_deref()))
    }

    /// Move the watermark to `timestamp`.
    ///
    /// A timestamp at or before the stored one is ignored. Returns whether the
    /// watermark moved.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn set_watermark(
        &self,
        entity_id: &str,
        domain: SourceDomain,
        timestamp: DateTime<Utc>,
    ) -> MemoryResult<bool> {
        let key = watermark_key(entity_id, domain);
        let lock = self.locks.entry(key.clone()).or_default().value().clone();
        let _guard = lock.lock().await;

        let current = decode(entity_id, domain, self.kv.get(&key).await?.as_deref());
        if timestamp.timestamp_millis() <= current.timestamp_millis() {
            debug!(
                entity_id,
                domain = %domain,
                "Watermark not advanced, timestamp is not newer"
            );
            return Ok(false);
        }

        self.kv
            .set(&key, timestamp.timestamp_millis().to_string())
            .await?;
        Ok(true)
    }

    /// Forget the watermark so the whole history is eligible again.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    pub async fn clear_watermark(&self, entity_id: &str, domain: SourceDomain) -> MemoryResult<()> {
        self.kv.remove(&watermark_key(entity_id, domain)).await
    }
}

fn decode(entity_id: &str, domain: SourceDomain, raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        return DateTime::<Utc>::UNIX_EPOCH;
    };
    raw.parse::<i64>()
        .ok()
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
        .unwrap_or_else(|| {
            warn!(entity_id, domain = %domain, value = raw, "Corrupt watermark, reading from the start");
            DateTime::<Utc>::UNIX_EPOCH
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::storage::kv_store::InMemoryKvStore;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_to_epoch() {
        let store = WatermarkStore::new(Arc::new(InMemoryKvStore::new()));
        let mark = store.get_watermark("alice", SourceDomain::Chat).await.unwrap();
        assert_eq!(mark, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn test_only_moves_forward() {
        let store = WatermarkStore::new(Arc::new(InMemoryKvStore::new()));
        assert!(store.set_watermark("alice", SourceDomain::Chat, at(2_000)).await.unwrap());
        assert!(!store.set_watermark("alice", SourceDomain::Chat, at(1_000)).await.unwrap());
        assert!(!store.set_watermark("alice", SourceDomain::Chat, at(2_000)).await.unwrap());
        assert_eq!(
            store.get_watermark("alice", SourceDomain::Chat).await.unwrap(),
            at(2_000)
        );
    }

    #[tokio::test]
    async fn test_domains_and_entities_are_separate() {
        let store = WatermarkStore::new(Arc::new(InMemoryKvStore::new()));
        store.set_watermark("alice", SourceDomain::Chat, at(5_000)).await.unwrap();
        assert_eq!(
            store.get_watermark("alice", SourceDomain::Forum).await.unwrap(),
            DateTime::<Utc>::UNIX_EPOCH
        );
        assert_eq!(
            store.get_watermark("bob", SourceDomain::Chat).await.unwrap(),
            DateTime::<Utc>::UNIX_EPOCH
        );
    }

    #[tokio::test]
    async fn test_clear_resets_to_epoch() {
        let store = WatermarkStore::new(Arc::new(InMemoryKvStore::new()));
        store.set_watermark("alice", SourceDomain::Offline, at(9_000)).await.unwrap();
        store.clear_watermark("alice", SourceDomain::Offline).await.unwrap();
        assert_eq!(
            store.get_watermark("alice", SourceDomain::Offline).await.unwrap(),
            DateTime::<Utc>::UNIX_EPOCH
        );
    }
}
