//! Key-value persistence for counters, watermarks and settings.

use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use dashmap::DashMap;
use rusqlite::OptionalExtension;
use tokio_rusqlite::Connection;

use crate::memory::core::config::StorageConfig;
use crate::memory::core::errors::MemoryResult;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// String key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get(&self, key: &str) -> StoreFuture<'_, MemoryResult<Option<String>>>;
    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn set(&self, key: &str, value: String) -> StoreFuture<'_, MemoryResult<()>>;
    /// Remove a value if present.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn remove(&self, key: &str) -> StoreFuture<'_, MemoryResult<()>>;
}

/// Process-local store, used in tests and when nothing needs to survive a restart.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: DashMap<String, String>,
}

impl InMemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryKvStore {
    fn get(&self, key: &str) -> StoreFuture<'_, MemoryResult<Option<String>>> {
        let value = self.entries.get(key).map(|entry| entry.value().clone());
        Box::pin(async move { Ok(value) })
    }

    fn set(&self, key: &str, value: String) -> StoreFuture<'_, MemoryResult<()>> {
        self.entries.insert(key.to_string(), value);
        Box::pin(async { Ok(()) })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, MemoryResult<()>> {
        self.entries.remove(key);
        Box::pin(async { Ok(()) })
    }
}

/// `SQLite` implementation of the key-value store.
pub struct SqliteKvStore {
    conn: Connection,
    table: String,
}

impl SqliteKvStore {
    /// Open (or create) the store at the configured path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &StorageConfig) -> MemoryResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::with_connection(conn, config.kv_table.clone()).await
    }

    /// Create the table on an existing connection.
    ///
    /// # Errors
    /// Returns an error if the table cannot be created.
    pub async fn with_connection(conn: Connection, table: String) -> MemoryResult<Self> {
        let table_name = table.clone();
        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                )"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl KeyValueStore for SqliteKvStore {
    fn get(&self, key: &str) -> StoreFuture<'_, MemoryResult<Option<String>>> {
        let key = key.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let value = self
                .conn
                .call(move |conn| {
                    let value = conn
                        .query_row(
                            &format!("SELECT value FROM {table} WHERE key = ?1"),
                            rusqlite::params![key],
                            |row| row.get::<_, String>(0),
                        )
                        .optional()?;
                    Ok(value)
                })
                .await?;
            Ok(value)
        })
    }

    fn set(&self, key: &str, value: String) -> StoreFuture<'_, MemoryResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let updated_at = Utc::now().timestamp_millis();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT OR REPLACE INTO {table} (key, value, updated_at)
                             VALUES (?1, ?2, ?3)"
                        ),
                        rusqlite::params![key, value, updated_at],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }

    fn remove(&self, key: &str) -> StoreFuture<'_, MemoryResult<()>> {
        let key = key.to_string();
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!("DELETE FROM {table} WHERE key = ?1"),
                        rusqlite::params![key],
                    )?;
                    Ok(())
                })
                .await?;
            Ok(())
        })
    }
}
