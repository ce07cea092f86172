//! Memory extraction subsystem for roleplay characters.
//!
//! Interaction logs are distilled into long-term memory records, organized into:
//! - `core`: Configuration, errors, IDs, kinds, interactions, and records
//! - `ingest`: Source adapters, log normalization, and turn collection
//! - `prompt`: Extraction prompt construction
//! - `summarization`: Summarizer client and reply parsing
//! - `storage`: Key-value, counter, watermark, and memory stores
//! - `engine`: Extraction passes and the background worker

pub mod core;
pub mod engine;
pub mod ingest;
pub mod prompt;
pub mod storage;
pub mod summarization;

// Re-export commonly used types for convenience
pub use self::core::{
    EmotionalTone, EntityRef, ExtractedBy, ExtractionConfig, Importance, Interaction,
    MemoryDomain, MemoryError, MemoryId, MemoryRecord, MemoryResult, MemoryUpdate, SourceDomain,
    TimeRange, WatermarkPolicy,
};
pub use engine::{BackgroundExtractor, ExtractionBackends, ExtractionEngine, ExtractionReport};
pub use ingest::{InteractionLog, SourceAdapter};
pub use storage::{
    InMemoryKvStore, InMemoryMemoryStore, KeyValueStore, MemoryFilter, MemoryStats, MemoryStore,
    SqliteKvStore, SqliteMemoryStore,
};
pub use summarization::{ExtractedMemory, LlmSummarizer, Summarizer};
