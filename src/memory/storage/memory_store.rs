//! Memory record store.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::MemoryId;
use crate::memory::core::kinds::{Importance, MemoryDomain};
use crate::memory::core::record::{MemoryRecord, MemoryUpdate};
use crate::memory::storage::kv_store::StoreFuture;

/// Selection over stored records. Empty fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemoryFilter {
    /// Only records about this entity.
    pub entity_id: Option<String>,
    /// Only records in this domain.
    pub domain: Option<MemoryDomain>,
    /// Keep at most this many of the newest matches.
    pub limit: Option<usize>,
}

impl MemoryFilter {
    /// Match every record of one entity.
    #[must_use]
    pub fn entity(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    /// Match every record in one domain.
    #[must_use]
    pub fn domain(domain: MemoryDomain) -> Self {
        Self {
            domain: Some(domain),
            ..Self::default()
        }
    }

    /// Keep only the newest `limit` matches.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// True when `record` satisfies the entity and domain constraints.
    #[must_use]
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        self.entity_id
            .as_deref()
            .is_none_or(|entity_id| record.entity_id == entity_id)
            && self.domain.is_none_or(|domain| record.domain == domain)
    }
}

/// Aggregate counts over stored records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Number of records.
    pub total: usize,
    /// Records per domain; domains without records are omitted.
    pub by_domain: BTreeMap<MemoryDomain, usize>,
    /// Records marked high importance.
    pub high_importance: usize,
}

impl MemoryStats {
    fn from_records(records: &[MemoryRecord]) -> Self {
        let mut stats = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            *stats.by_domain.entry(record.domain).or_default() += 1;
            if record.importance == Importance::High {
                stats.high_importance += 1;
            }
        }
        stats
    }
}

/// Newest first; ties broken by id so listings are stable.
pub(crate) fn newest_first(a: &MemoryRecord, b: &MemoryRecord) -> Ordering {
    b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id))
}

/// Append-only store of memory records.
///
/// Records change only through [`MemoryStore::update`] and
/// [`MemoryStore::delete`]. Listings are ordered newest first.
pub trait MemoryStore: Send + Sync {
    /// Persist a record and return its id.
    ///
    /// A record whose id is already taken is stored under a fresh id rather
    /// than replacing the existing one.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn add(&self, record: MemoryRecord) -> StoreFuture<'_, MemoryResult<MemoryId>>;

    /// Fetch one record.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get(&self, id: MemoryId) -> StoreFuture<'_, MemoryResult<Option<MemoryRecord>>>;

    /// Records matching `filter`, newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn query(&self, filter: MemoryFilter) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>>;

    /// Apply an explicit edit and return the updated record.
    ///
    /// # Errors
    /// Returns [`MemoryError::RecordNotFound`] for an unknown id, or an error
    /// if the edit is invalid or storage access fails.
    fn update(
        &self,
        id: MemoryId,
        update: MemoryUpdate,
    ) -> StoreFuture<'_, MemoryResult<MemoryRecord>>;

    /// Remove a record. Returns whether it existed.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn delete(&self, id: MemoryId) -> StoreFuture<'_, MemoryResult<bool>>;

    /// Remove every record.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn clear(&self) -> StoreFuture<'_, MemoryResult<()>>;

    /// Records about one entity, newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_by_entity(&self, entity_id: &str) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        self.query(MemoryFilter::entity(entity_id))
    }

    /// Records in one domain, newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_by_domain(
        &self,
        domain: MemoryDomain,
    ) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        self.query(MemoryFilter::domain(domain))
    }

    /// Every record, newest first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn all(&self) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        self.query(MemoryFilter::default())
    }

    /// Case-insensitive text search over title, summary and tags.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn search(&self, text: &str) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        let text = text.to_string();
        Box::pin(async move {
            let records = self.all().await?;
            Ok(records
                .into_iter()
                .filter(|record| record.matches_text(&text))
                .collect())
        })
    }

    /// Counts by domain and importance.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn stats(&self) -> StoreFuture<'_, MemoryResult<MemoryStats>> {
        Box::pin(async move {
            let records = self.all().await?;
            Ok(MemoryStats::from_records(&records))
        })
    }
}

/// Process-local memory store.
#[derive(Debug, Default)]
pub struct InMemoryMemoryStore {
    records: DashMap<MemoryId, MemoryRecord>,
}

impl InMemoryMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryStore for InMemoryMemoryStore {
    fn add(&self, mut record: MemoryRecord) -> StoreFuture<'_, MemoryResult<MemoryId>> {
        let id = loop {
            match self.records.entry(record.id) {
                Entry::Occupied(_) => record.id = MemoryId::new(),
                Entry::Vacant(slot) => {
                    let id = record.id;
                    slot.insert(record);
                    break id;
                }
            }
        };
        Box::pin(async move { Ok(id) })
    }

    fn get(&self, id: MemoryId) -> StoreFuture<'_, MemoryResult<Option<MemoryRecord>>> {
        let record = self.records.get(&id).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(record) })
    }

    fn query(&self, filter: MemoryFilter) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        let mut records: Vec<MemoryRecord> = self
            .records
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(newest_first);
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Box::pin(async move { Ok(records) })
    }

    fn update(
        &self,
        id: MemoryId,
        update: MemoryUpdate,
    ) -> StoreFuture<'_, MemoryResult<MemoryRecord>> {
        let result = match self.records.get_mut(&id) {
            Some(mut entry) => {
                let mut edited = entry.value().clone();
                edited.apply(update).map(|()| {
                    *entry.value_mut() = edited.clone();
                    edited
                })
            }
            None => Err(MemoryError::RecordNotFound(id.to_string())),
        };
        Box::pin(async move { result })
    }

    fn delete(&self, id: MemoryId) -> StoreFuture<'_, MemoryResult<bool>> {
        let existed = self.records.remove(&id).is_some();
        Box::pin(async move { Ok(existed) })
    }

    fn clear(&self) -> StoreFuture<'_, MemoryResult<()>> {
        self.records.clear();
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::memory::core::ids::EntityRef;
    use crate::memory::core::kinds::ExtractedBy;

    fn record(entity: &str, domain: MemoryDomain, title: &str, age_minutes: i64) -> MemoryRecord {
        let mut record = MemoryRecord::new(
            domain,
            &EntityRef::new(entity, entity.to_uppercase()),
            title,
            format!("{title} happened"),
            ExtractedBy::Auto,
        )
        .unwrap();
        record.timestamp = Utc::now() - Duration::minutes(age_minutes);
        record
    }

    #[tokio::test]
    async fn test_listings_are_newest_first_and_filtered() {
        let store = InMemoryMemoryStore::new();
        store.add(record("alice", MemoryDomain::Conversation, "old", 30)).await.unwrap();
        store.add(record("alice", MemoryDomain::Action, "new", 1)).await.unwrap();
        store.add(record("bob", MemoryDomain::Conversation, "other", 5)).await.unwrap();

        let alice = store.get_by_entity("alice").await.unwrap();
        assert_eq!(
            alice.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
            vec!["new", "old"]
        );
        let chats = store.get_by_domain(MemoryDomain::Conversation).await.unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].title, "other");

        let latest = store
            .query(MemoryFilter::default().with_limit(1))
            .await
            .unwrap();
        assert_eq!(latest[0].title, "new");
    }

    #[tokio::test]
    async fn test_add_never_overwrites() {
        let store = InMemoryMemoryStore::new();
        let first = record("alice", MemoryDomain::Conversation, "first", 2);
        let mut second = record("alice", MemoryDomain::Conversation, "second", 1);
        second.id = first.id;

        let first_id = store.add(first).await.unwrap();
        let second_id = store.add(second).await.unwrap();
        assert_ne!(first_id, second_id);
        assert_eq!(store.all().await.unwrap().len(), 2);
        assert_eq!(store.get(first_id).await.unwrap().unwrap().title, "first");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = InMemoryMemoryStore::new();
        let id = store
            .add(record("alice", MemoryDomain::Conversation, "draft", 1))
            .await
            .unwrap();

        let updated = store
            .update(
                id,
                MemoryUpdate {
                    title: Some("final".to_string()),
                    importance: Some(Importance::High),
                    ..MemoryUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "final");
        assert_eq!(store.get(id).await.unwrap().unwrap().importance, Importance::High);

        let blank = MemoryUpdate {
            summary: Some("  ".to_string()),
            ..MemoryUpdate::default()
        };
        assert!(store.update(id, blank).await.is_err());
        assert_eq!(store.get(id).await.unwrap().unwrap().title, "final");

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(matches!(
            store.update(id, MemoryUpdate::default()).await,
            Err(MemoryError::RecordNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_search_and_stats() {
        let store = InMemoryMemoryStore::new();
        store
            .add(
                record("alice", MemoryDomain::Conversation, "Beach trip", 3)
                    .with_importance(Importance::High)
                    .with_tags(["summer"]),
            )
            .await
            .unwrap();
        store.add(record("alice", MemoryDomain::SocialFeed, "Posted a cat", 2)).await.unwrap();

        assert_eq!(store.search("BEACH").await.unwrap().len(), 1);
        assert_eq!(store.search("summer").await.unwrap().len(), 1);
        assert!(store.search("mountain").await.unwrap().is_empty());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.high_importance, 1);
        assert_eq!(stats.by_domain.get(&MemoryDomain::SocialFeed), Some(&1));
        assert_eq!(stats.by_domain.get(&MemoryDomain::Action), None);

        store.clear().await.unwrap();
        assert_eq!(store.stats().await.unwrap(), MemoryStats::default());
    }
}
