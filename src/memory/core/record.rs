//! Memory record model with validation helpers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::{EntityRef, MemoryId};
use crate::memory::core::kinds::{EmotionalTone, ExtractedBy, Importance, MemoryDomain};

/// Span of source interactions a record summarizes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Earliest summarized interaction.
    pub start: DateTime<Utc>,
    /// Latest summarized interaction.
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Smallest range covering every timestamp, or `None` for an empty input.
    #[must_use]
    pub fn covering<I>(timestamps: I) -> Option<Self>
    where
        I: IntoIterator<Item = DateTime<Utc>>,
    {
        let mut iter = timestamps.into_iter();
        let first = iter.next()?;
        let (start, end) = iter.fold((first, first), |(lo, hi), ts| (lo.min(ts), hi.max(ts)));
        Some(Self { start, end })
    }
}

/// A stored memory about one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique record identifier.
    pub id: MemoryId,
    /// Coarse category.
    pub domain: MemoryDomain,
    /// Entity the memory is about.
    pub entity_id: String,
    /// Entity display name at extraction time.
    pub entity_name: String,
    /// Optional avatar hint.
    pub entity_avatar: Option<String>,
    /// Short label.
    pub title: String,
    /// Free-text synopsis.
    pub summary: String,
    /// Importance tier.
    pub importance: Importance,
    /// Keyword tags.
    pub tags: BTreeSet<String>,
    /// Emotional colour.
    pub emotional_tone: EmotionalTone,
    /// Standalone statements distilled alongside the summary.
    #[serde(default)]
    pub facts: Vec<String>,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Source span, when known.
    pub time_range: Option<TimeRange>,
    /// Provenance.
    pub extracted_by: ExtractedBy,
}

impl MemoryRecord {
    /// Create a record with default importance, tone and no tags.
    ///
    /// # Errors
    /// Returns an error if the title or summary is empty after trimming.
    pub fn new(
        domain: MemoryDomain,
        entity: &EntityRef,
        title: impl Into<String>,
        summary: impl Into<String>,
        extracted_by: ExtractedBy,
    ) -> MemoryResult<Self> {
        let title = title.into().trim().to_string();
        let summary = summary.into().trim().to_string();
        if title.is_empty() {
            return Err(MemoryError::InvalidRecord("title is empty".to_string()));
        }
        if summary.is_empty() {
            return Err(MemoryError::InvalidRecord("summary is empty".to_string()));
        }

        Ok(Self {
            id: MemoryId::new(),
            domain,
            entity_id: entity.id.clone(),
            entity_name: entity.name.clone(),
            entity_avatar: entity.avatar.clone(),
            title,
            summary,
            importance: Importance::default(),
            tags: BTreeSet::new(),
            emotional_tone: EmotionalTone::default(),
            facts: Vec::new(),
            timestamp: Utc::now(),
            time_range: None,
            extracted_by,
        })
    }

    /// Set the importance tier.
    #[must_use]
    pub const fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    /// Set the emotional tone.
    #[must_use]
    pub const fn with_tone(mut self, tone: EmotionalTone) -> Self {
        self.emotional_tone = tone;
        self
    }

    /// Replace the tags, dropping blanks.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = clean_tags(tags);
        self
    }

    /// Replace the facts, dropping blanks.
    #[must_use]
    pub fn with_facts(mut self, facts: Vec<String>) -> Self {
        self.facts = facts
            .into_iter()
            .map(|fact| fact.trim().to_string())
            .filter(|fact| !fact.is_empty())
            .collect();
        self
    }

    /// Attach the summarized source span.
    #[must_use]
    pub const fn with_time_range(mut self, range: Option<TimeRange>) -> Self {
        self.time_range = range;
        self
    }

    /// Preferred display time: the end of the source span, else creation time.
    #[must_use]
    pub fn display_time(&self) -> DateTime<Utc> {
        self.time_range.map_or(self.timestamp, |range| range.end)
    }

    /// Apply an explicit update. Identity, provenance and timestamps are kept.
    ///
    /// # Errors
    /// Returns an error if the update would blank the title or summary.
    pub fn apply(&mut self, update: MemoryUpdate) -> MemoryResult<()> {
        if let Some(title) = update.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(MemoryError::InvalidRecord("title is empty".to_string()));
            }
            self.title = title.to_string();
        }
        if let Some(summary) = update.summary {
            let summary = summary.trim();
            if summary.is_empty() {
                return Err(MemoryError::InvalidRecord("summary is empty".to_string()));
            }
            self.summary = summary.to_string();
        }
        if let Some(tags) = update.tags {
            self.tags = clean_tags(tags);
        }
        if let Some(importance) = update.importance {
            self.importance = importance;
        }
        if let Some(tone) = update.emotional_tone {
            self.emotional_tone = tone;
        }
        Ok(())
    }

    /// True when the query appears in the title, summary or a tag (case-insensitive).
    #[must_use]
    pub fn matches_text(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&needle)
            || self.summary.to_lowercase().contains(&needle)
            || self.tags.iter().any(|tag| tag.to_lowercase().contains(&needle))
    }
}

/// Partial update for an existing record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    /// Replacement title.
    pub title: Option<String>,
    /// Replacement summary.
    pub summary: Option<String>,
    /// Replacement tag set.
    pub tags: Option<Vec<String>>,
    /// Replacement importance.
    pub importance: Option<Importance>,
    /// Replacement tone.
    pub emotional_tone: Option<EmotionalTone>,
}

fn clean_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tags.into_iter()
        .map(|tag| tag.into().trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}
