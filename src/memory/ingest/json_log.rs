//! File-backed source adapter.
//!
//! Reads one entity's five interaction logs from a JSON document, the format
//! a chat client export produces.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::memory::core::errors::MemoryResult;
use crate::memory::core::ids::EntityRef;
use crate::memory::ingest::sources::{
    ChatMessage, FeedPost, ForumThread, GroupMessage, OfflineRecord, SourceAdapter, SourceFuture,
};

/// Every log the chat client keeps for one entity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionLog {
    /// The entity the logs belong to.
    pub entity: Option<EntityRef>,
    /// Private chat.
    #[serde(default)]
    pub chat: Vec<ChatMessage>,
    /// Group chat.
    #[serde(default)]
    pub group_chat: Vec<GroupMessage>,
    /// Social-feed posts.
    #[serde(default)]
    pub social_feed: Vec<FeedPost>,
    /// Forum threads.
    #[serde(default)]
    pub forum: Vec<ForumThread>,
    /// Offline sessions.
    #[serde(default)]
    pub offline: Vec<OfflineRecord>,
}

impl InteractionLog {
    /// Parse a log from JSON text.
    ///
    /// # Errors
    /// Returns an error if the text is not a valid log document.
    pub fn from_json(text: &str) -> MemoryResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a log file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> MemoryResult<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let log = Self::from_json(&text)?;
        debug!(
            path = %path.display(),
            chat = log.chat.len(),
            group_chat = log.group_chat.len(),
            social_feed = log.social_feed.len(),
            forum = log.forum.len(),
            offline = log.offline.len(),
            "Loaded interaction log"
        );
        Ok(log)
    }
}

impl SourceAdapter for InteractionLog {
    fn chat_messages<'a>(
        &'a self,
        _entity: &'a EntityRef,
    ) -> SourceFuture<'a, MemoryResult<Vec<ChatMessage>>> {
        Box::pin(async move { Ok(self.chat.clone()) })
    }

    fn group_messages<'a>(
        &'a self,
        _entity: &'a EntityRef,
    ) -> SourceFuture<'a, MemoryResult<Vec<GroupMessage>>> {
        Box::pin(async move { Ok(self.group_chat.clone()) })
    }

    fn feed_posts<'a>(
        &'a self,
        _entity: &'a EntityRef,
    ) -> SourceFuture<'a, MemoryResult<Vec<FeedPost>>> {
        Box::pin(async move { Ok(self.social_feed.clone()) })
    }

    fn forum_threads<'a>(
        &'a self,
        _entity: &'a EntityRef,
    ) -> SourceFuture<'a, MemoryResult<Vec<ForumThread>>> {
        Box::pin(async move { Ok(self.forum.clone()) })
    }

    fn offline_records<'a>(
        &'a self,
        _entity: &'a EntityRef,
    ) -> SourceFuture<'a, MemoryResult<Vec<OfflineRecord>>> {
        Box::pin(async move { Ok(self.offline.clone()) })
    }
}
