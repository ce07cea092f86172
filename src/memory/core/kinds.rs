//! Closed vocabularies carried by memory records.
//!
//! Every enum here has a stable `snake_case` identifier used for storage and
//! for the JSON contract with the summarization service. Parsing is lenient
//! (case, separators and a few aliases) because the values arrive from model
//! output; `parse_lossy` falls back to the documented default instead of
//! failing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a vocabulary string is not recognized.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unrecognized {vocabulary} value: {value:?}")]
pub struct KindParseError {
    /// Which vocabulary was being parsed.
    pub vocabulary: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Lowercase and fold `-`/space separators into `_`.
fn normalize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|ch| match ch {
            '-' | ' ' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Coarse category a memory is filed under.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryDomain {
    /// Private and group conversations.
    Conversation,
    /// Social-feed posts and forum threads.
    SocialFeed,
    /// Offline sessions and other activities.
    Action,
}

impl MemoryDomain {
    /// All domains in display order.
    pub const ALL: [Self; 3] = [Self::Conversation, Self::SocialFeed, Self::Action];

    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::SocialFeed => "social_feed",
            Self::Action => "action",
        }
    }
}

impl fmt::Display for MemoryDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MemoryDomain {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "conversation" | "chat" => Ok(Self::Conversation),
            "social_feed" | "socialfeed" | "moments" | "feed" => Ok(Self::SocialFeed),
            "action" | "misc" => Ok(Self::Action),
            _ => Err(KindParseError {
                vocabulary: "memory domain",
                value: s.to_string(),
            }),
        }
    }
}

/// One of the five interaction sources an extraction pass reads.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceDomain {
    /// Private chat between subject and counterpart.
    Chat,
    /// Group chat, reduced to the subject's own contributions.
    GroupChat,
    /// Social-feed posts, likes and comments.
    SocialFeed,
    /// Forum threads and replies.
    Forum,
    /// Offline-session records.
    Offline,
}

impl SourceDomain {
    /// Processing order of an extraction pass.
    pub const ALL: [Self; 5] = [
        Self::Chat,
        Self::GroupChat,
        Self::SocialFeed,
        Self::Forum,
        Self::Offline,
    ];

    /// Stable string form, used in watermark keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::GroupChat => "group_chat",
            Self::SocialFeed => "social_feed",
            Self::Forum => "forum",
            Self::Offline => "offline",
        }
    }

    /// Memory domain the records of this source are filed under.
    #[must_use]
    pub const fn memory_domain(self) -> MemoryDomain {
        match self {
            Self::Chat | Self::GroupChat => MemoryDomain::Conversation,
            Self::SocialFeed | Self::Forum => MemoryDomain::SocialFeed,
            Self::Offline => MemoryDomain::Action,
        }
    }

    /// True when the source is turn-paired dialogue.
    #[must_use]
    pub const fn is_conversational(self) -> bool {
        matches!(self, Self::Chat | Self::GroupChat)
    }

    /// Human label used inside prompts.
    #[must_use]
    pub const fn prompt_label(self) -> &'static str {
        match self {
            Self::Chat => "private chat",
            Self::GroupChat => "group chat",
            Self::SocialFeed => "social feed activity",
            Self::Forum => "forum activity",
            Self::Offline => "offline session",
        }
    }
}

impl fmt::Display for SourceDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How much weight a memory carries.
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    /// Worth surfacing first.
    High,
    /// Default tier.
    #[default]
    Normal,
    /// Background detail.
    Low,
}

impl Importance {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    /// Lossy parsing: returns `Normal` instead of failing.
    #[must_use]
    pub fn parse_lossy(s: &str) -> Self {
        Self::from_str(s).unwrap_or_default()
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Importance {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "high" | "important" | "critical" => Ok(Self::High),
            "normal" | "medium" | "mid" => Ok(Self::Normal),
            "low" | "minor" => Ok(Self::Low),
            _ => Err(KindParseError {
                vocabulary: "importance",
                value: s.to_string(),
            }),
        }
    }
}

/// Overall emotional colour of a memory.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalTone {
    /// Warm, happy, affectionate.
    Positive,
    /// Default tone.
    #[default]
    Neutral,
    /// Sad, tense, hurt.
    Negative,
}

impl EmotionalTone {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    /// Lossy parsing: returns `Neutral` instead of failing.
    #[must_use]
    pub fn parse_lossy(s: &str) -> Self {
        Self::from_str(s).unwrap_or_default()
    }
}

impl fmt::Display for EmotionalTone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EmotionalTone {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "positive" | "pos" => Ok(Self::Positive),
            "neutral" | "mixed" => Ok(Self::Neutral),
            "negative" | "neg" => Ok(Self::Negative),
            _ => Err(KindParseError {
                vocabulary: "emotional tone",
                value: s.to_string(),
            }),
        }
    }
}

/// Provenance of a memory record.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractedBy {
    /// Written by a person through the UI.
    Manual,
    /// Produced by an extraction pass.
    Auto,
}

impl ExtractedBy {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ExtractedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ExtractedBy {
    type Err = KindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            _ => Err(KindParseError {
                vocabulary: "extracted_by",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_domain_maps_to_memory_domain() {
        assert_eq!(SourceDomain::Chat.memory_domain(), MemoryDomain::Conversation);
        assert_eq!(SourceDomain::GroupChat.memory_domain(), MemoryDomain::Conversation);
        assert_eq!(SourceDomain::Forum.memory_domain(), MemoryDomain::SocialFeed);
        assert_eq!(SourceDomain::Offline.memory_domain(), MemoryDomain::Action);
    }

    #[test]
    fn test_importance_parsing_is_lenient() {
        assert_eq!(Importance::parse_lossy(" HIGH "), Importance::High);
        assert_eq!(Importance::parse_lossy("medium"), Importance::Normal);
        assert_eq!(Importance::parse_lossy("whatever"), Importance::Normal);
    }

    #[test]
    fn test_tone_parsing_falls_back_to_neutral() {
        assert_eq!(EmotionalTone::parse_lossy("Positive"), EmotionalTone::Positive);
        assert_eq!(EmotionalTone::parse_lossy("bittersweet"), EmotionalTone::Neutral);
    }

    #[test]
    fn test_memory_domain_accepts_legacy_names() {
        assert_eq!("moments".parse::<MemoryDomain>(), Ok(MemoryDomain::SocialFeed));
        assert_eq!("chat".parse::<MemoryDomain>(), Ok(MemoryDomain::Conversation));
        assert!("forum".parse::<MemoryDomain>().is_err());
    }
}
