//! Source normalization and turn collection.

pub mod json_log;
pub mod sources;
pub mod turn_collector;

pub use json_log::InteractionLog;
pub use sources::{
    Attachment, ChatMessage, FeedPost, ForumThread, GroupMessage, MessageDirection,
    OfflineRecord, Reply, SourceAdapter, SourceFuture, fetch_interactions,
};
pub use turn_collector::{DialogueTurn, UNPROMPTED_MARKER, collect_dialogue_turns};
