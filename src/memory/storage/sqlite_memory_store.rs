//! `SQLite` implementation of the memory store.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::memory::core::config::StorageConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::MemoryId;
use crate::memory::core::record::{MemoryRecord, MemoryUpdate, TimeRange};
use crate::memory::storage::kv_store::StoreFuture;
use crate::memory::storage::memory_store::{MemoryFilter, MemoryStore};

const COLUMNS: &str = "id, domain, entity_id, entity_name, entity_avatar, title, summary, \
importance, tags, emotional_tone, facts, created_at, range_start, range_end, extracted_by";

/// One row as stored; enums as text, lists as JSON, times as epoch millis.
struct StoredRow {
    id: String,
    domain: String,
    entity_id: String,
    entity_name: String,
    entity_avatar: Option<String>,
    title: String,
    summary: String,
    importance: String,
    tags: String,
    emotional_tone: String,
    facts: String,
    created_at: i64,
    range_start: Option<i64>,
    range_end: Option<i64>,
    extracted_by: String,
}

impl StoredRow {
    fn from_record(record: &MemoryRecord) -> MemoryResult<Self> {
        Ok(Self {
            id: record.id.to_string(),
            domain: record.domain.as_str().to_string(),
            entity_id: record.entity_id.clone(),
            entity_name: record.entity_name.clone(),
            entity_avatar: record.entity_avatar.clone(),
            title: record.title.clone(),
            summary: record.summary.clone(),
            importance: record.importance.as_str().to_string(),
            tags: serde_json::to_string(&record.tags)?,
            emotional_tone: record.emotional_tone.as_str().to_string(),
            facts: serde_json::to_string(&record.facts)?,
            created_at: record.timestamp.timestamp_millis(),
            range_start: record.time_range.map(|range| range.start.timestamp_millis()),
            range_end: record.time_range.map(|range| range.end.timestamp_millis()),
            extracted_by: record.extracted_by.as_str().to_string(),
        })
    }

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            domain: row.get(1)?,
            entity_id: row.get(2)?,
            entity_name: row.get(3)?,
            entity_avatar: row.get(4)?,
            title: row.get(5)?,
            summary: row.get(6)?,
            importance: row.get(7)?,
            tags: row.get(8)?,
            emotional_tone: row.get(9)?,
            facts: row.get(10)?,
            created_at: row.get(11)?,
            range_start: row.get(12)?,
            range_end: row.get(13)?,
            extracted_by: row.get(14)?,
        })
    }

    fn into_record(self) -> MemoryResult<MemoryRecord> {
        let invalid = |what: &str, value: &str| {
            MemoryError::InvalidRecord(format!("stored {what} is invalid: {value}"))
        };

        let id = self
            .id
            .parse::<MemoryId>()
            .map_err(|_| invalid("id", &self.id))?;
        let time_range = match (self.range_start, self.range_end) {
            (Some(start), Some(end)) => Some(TimeRange {
                start: millis_to_datetime(start)?,
                end: millis_to_datetime(end)?,
            }),
            _ => None,
        };

        Ok(MemoryRecord {
            id,
            domain: self
                .domain
                .parse()
                .map_err(|_| invalid("domain", &self.domain))?,
            entity_id: self.entity_id,
            entity_name: self.entity_name,
            entity_avatar: self.entity_avatar,
            title: self.title,
            summary: self.summary,
            importance: self
                .importance
                .parse()
                .map_err(|_| invalid("importance", &self.importance))?,
            tags: serde_json::from_str::<BTreeSet<String>>(&self.tags)?,
            emotional_tone: self
                .emotional_tone
                .parse()
                .map_err(|_| invalid("emotional tone", &self.emotional_tone))?,
            facts: serde_json::from_str(&self.facts)?,
            timestamp: millis_to_datetime(self.created_at)?,
            time_range,
            extracted_by: self
                .extracted_by
                .parse()
                .map_err(|_| invalid("provenance", &self.extracted_by))?,
        })
    }
}

fn millis_to_datetime(millis: i64) -> MemoryResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| MemoryError::InvalidRecord(format!("invalid timestamp {millis}")))
}

/// `SQLite` implementation of the memory store.
pub struct SqliteMemoryStore {
    conn: Connection,
    table: String,
}

impl SqliteMemoryStore {
    /// Open (or create) the store at the configured path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> MemoryResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(conn, config.memory_table.clone()).await
    }

    /// Create the table and indexes on an existing connection.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub async fn with_connection(conn: Connection, table: String) -> MemoryResult<Self> {
        let table_name = table.clone();
        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id TEXT PRIMARY KEY,
                    domain TEXT NOT NULL,
                    entity_id TEXT NOT NULL,
                    entity_name TEXT NOT NULL,
                    entity_avatar TEXT,
                    title TEXT NOT NULL,
                    summary TEXT NOT NULL,
                    importance TEXT NOT NULL,
                    tags TEXT NOT NULL,
                    emotional_tone TEXT NOT NULL,
                    facts TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    range_start INTEGER,
                    range_end INTEGER,
                    extracted_by TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_entity ON {table_name}(entity_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_{table_name}_domain ON {table_name}(domain, created_at);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl MemoryStore for SqliteMemoryStore {
    fn add(&self, record: MemoryRecord) -> StoreFuture<'_, MemoryResult<MemoryId>> {
        Box::pin(async move {
            let table = self.table.clone();
            let mut row = StoredRow::from_record(&record)?;

            let id = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction()?;
                    loop {
                        let taken = tx
                            .query_row(
                                &format!("SELECT 1 FROM {table} WHERE id = ?1"),
                                rusqlite::params![row.id],
                                |_| Ok(()),
                            )
                            .optional()?
                            .is_some();
                        if !taken {
                            break;
                        }
                        row.id = MemoryId::new().to_string();
                    }
                    tx.execute(
                        &format!("INSERT INTO {table} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"),
                        rusqlite::params![
                            row.id,
                            row.domain,
                            row.entity_id,
                            row.entity_name,
                            row.entity_avatar,
                            row.title,
                            row.summary,
                            row.importance,
                            row.tags,
                            row.emotional_tone,
                            row.facts,
                            row.created_at,
                            row.range_start,
                            row.range_end,
                            row.extracted_by,
                        ],
                    )?;
                    tx.commit()?;
                    Ok(row.id)
                })
                .await?;

            id.parse::<MemoryId>()
                .map_err(|_| MemoryError::InvalidRecord(format!("stored id is invalid: {id}")))
        })
    }

    fn get(&self, id: MemoryId) -> StoreFuture<'_, MemoryResult<Option<MemoryRecord>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let key = id.to_string();
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!("SELECT {COLUMNS} FROM {table} WHERE id = ?1"),
                            rusqlite::params![key],
                            StoredRow::read,
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;
            row.map(StoredRow::into_record).transpose()
        })
    }

    fn query(&self, filter: MemoryFilter) -> StoreFuture<'_, MemoryResult<Vec<MemoryRecord>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let entity_id = filter.entity_id;
            let domain = filter.domain.map(|domain| domain.as_str().to_string());
            // SQLite reads a negative LIMIT as no limit.
            let limit = filter
                .limit
                .map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));

            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLUMNS} FROM {table}
                         WHERE (?1 IS NULL OR entity_id = ?1)
                           AND (?2 IS NULL OR domain = ?2)
                         ORDER BY created_at DESC, id DESC
                         LIMIT ?3"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![entity_id, domain, limit], StoredRow::read)?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(rows)
                })
                .await?;

            rows.into_iter().map(StoredRow::into_record).collect()
        })
    }

    fn update(
        &self,
        id: MemoryId,
        update: MemoryUpdate,
    ) -> StoreFuture<'_, MemoryResult<MemoryRecord>> {
        Box::pin(async move {
            let mut record = self
                .get(id)
                .await?
                .ok_or_else(|| MemoryError::RecordNotFound(id.to_string()))?;
            record.apply(update)?;

            let table = self.table.clone();
            let row = StoredRow::from_record(&record)?;
            let changed = self
                .conn
                .call(move |conn| {
                    let changed = conn.execute(
                        &format!(
                            "UPDATE {table}
                             SET title = ?2, summary = ?3, tags = ?4, importance = ?5, emotional_tone = ?6
                             WHERE id = ?1"
                        ),
                        rusqlite::params![
                            row.id,
                            row.title,
                            row.summary,
                            row.tags,
                            row.importance,
                            row.emotional_tone,
                        ],
                    )?;
                    Ok(changed)
                })
                .await?;

            if changed == 0 {
                return Err(MemoryError::RecordNotFound(id.to_string()));
            }
            Ok(record)
        })
    }

    fn delete(&self, id: MemoryId) -> StoreFuture<'_, MemoryResult<bool>> {
        Box::pin(async move {
            let table = self.table.clone();
            let key = id.to_string();
            let changed = self
                .conn
                .call(move |conn| {
                    let changed = conn.execute(
                        &format!("DELETE FROM {table} WHERE id = ?1"),
                        rusqlite::params![key],
                    )?;
                    Ok(changed)
                })
                .await?;
            Ok(changed > 0)
        })
    }

    fn clear(&self) -> StoreFuture<'_, MemoryResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(&format!("DELETE FROM {table}"), [])?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::memory::core::ids::EntityRef;
    use crate::memory::core::kinds::{EmotionalTone, ExtractedBy, Importance, MemoryDomain};

    async fn store() -> SqliteMemoryStore {
        let conn = Connection::open_in_memory().await.unwrap();
        SqliteMemoryStore::with_connection(conn, "memories_test".to_string())
            .await
            .unwrap()
    }

    fn sample(title: &str) -> MemoryRecord {
        let entity = EntityRef::new("char-1", "Mika").with_avatar("mika.png");
        let start = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        MemoryRecord::new(
            MemoryDomain::Conversation,
            &entity,
            title,
            "We planned a picnic.",
            ExtractedBy::Auto,
        )
        .unwrap()
        .with_importance(Importance::High)
        .with_tone(EmotionalTone::Positive)
        .with_tags(["picnic", "weekend"])
        .with_facts(vec!["Mika likes strawberries".to_string()])
        .with_time_range(Some(TimeRange {
            start,
            end: start + Duration::minutes(20),
        }))
    }

    #[tokio::test]
    async fn test_record_survives_storage() {
        let store = store().await;
        let record = sample("Picnic plans");
        let id = store.add(record.clone()).await.unwrap();

        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.title, record.title);
        assert_eq!(loaded.entity_avatar.as_deref(), Some("mika.png"));
        assert_eq!(loaded.tags, record.tags);
        assert_eq!(loaded.facts, record.facts);
        assert_eq!(loaded.time_range, record.time_range);
        assert_eq!(loaded.importance, Importance::High);
        assert_eq!(loaded.extracted_by, ExtractedBy::Auto);
        assert_eq!(
            loaded.timestamp.timestamp_millis(),
            record.timestamp.timestamp_millis()
        );
    }

    #[tokio::test]
    async fn test_duplicate_id_gets_fresh_id() {
        let store = store().await;
        let record = sample("Once");
        let first = store.add(record.clone()).await.unwrap();
        let second = store.add(record).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_query_orders_and_limits() {
        let store = store().await;
        let mut older = sample("Older");
        older.timestamp = Utc::now() - Duration::hours(2);
        store.add(older).await.unwrap();
        store.add(sample("Newer")).await.unwrap();

        let mut other = sample("Elsewhere");
        other.entity_id = "char-2".to_string();
        other.domain = MemoryDomain::Action;
        store.add(other).await.unwrap();

        let mine = store.get_by_entity("char-1").await.unwrap();
        assert_eq!(
            mine.iter().map(|r| r.title.as_str()).collect::<Vec<_>>(),
            vec!["Newer", "Older"]
        );
        let actions = store.get_by_domain(MemoryDomain::Action).await.unwrap();
        assert_eq!(actions.len(), 1);

        let newest = store
            .query(MemoryFilter::entity("char-1").with_limit(1))
            .await
            .unwrap();
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].title, "Newer");
    }

    #[tokio::test]
    async fn test_update_delete_clear() {
        let store = store().await;
        let id = store.add(sample("Draft")).await.unwrap();

        let update = MemoryUpdate {
            title: Some("Picnic".to_string()),
            tags: Some(vec!["outdoors".to_string()]),
            ..MemoryUpdate::default()
        };
        let updated = store.update(id, update).await.unwrap();
        assert_eq!(updated.title, "Picnic");

        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Picnic");
        assert!(loaded.tags.contains("outdoors"));
        assert_eq!(loaded.summary, "We planned a picnic.");

        assert!(matches!(
            store.update(MemoryId::new(), MemoryUpdate::default()).await,
            Err(MemoryError::RecordNotFound(_))
        ));

        assert!(store.delete(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());

        store.add(sample("Again")).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.all().await.unwrap().is_empty());
    }
}
