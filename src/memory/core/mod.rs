//! Core memory types and identifiers.

pub mod config;
pub mod errors;
pub mod ids;
pub mod interaction;
pub mod kinds;
pub mod record;

pub use config::{
    ExtractionConfig, LlmConfig, PromptConfig, StorageConfig, TriggerConfig, WatermarkPolicy,
};
pub use errors::{MemoryError, MemoryResult};
pub use ids::{EntityRef, MemoryId};
pub use interaction::{Actor, Interaction, InteractionKind};
pub use kinds::{
    EmotionalTone, ExtractedBy, Importance, KindParseError, MemoryDomain, SourceDomain,
};
pub use record::{MemoryRecord, MemoryUpdate, TimeRange};
