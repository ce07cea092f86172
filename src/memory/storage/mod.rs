//! Persistent storage for counters, watermarks and memory records.

pub mod counter;
pub mod kv_store;
pub mod memory_store;
pub mod sqlite_memory_store;
pub mod watermark;

pub use counter::InteractionCounter;
pub use kv_store::{InMemoryKvStore, KeyValueStore, SqliteKvStore, StoreFuture};
pub use memory_store::{InMemoryMemoryStore, MemoryFilter, MemoryStats, MemoryStore};
pub use sqlite_memory_store::SqliteMemoryStore;
pub use watermark::WatermarkStore;
