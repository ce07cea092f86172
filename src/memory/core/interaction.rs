//! Normalized interaction model shared by every source domain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced an interaction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    /// The entity the memory is about.
    Subject,
    /// The other party.
    Counterpart,
}

/// Payload of one interaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionKind {
    /// Plain text.
    Text {
        /// Message body.
        text: String,
    },
    /// Photo or image.
    Photo,
    /// Voice note, optionally transcribed.
    Voice {
        /// Transcript, when available.
        #[serde(default)]
        transcript: Option<String>,
    },
    /// Shared location.
    Location {
        /// Place name, when known.
        #[serde(default)]
        name: Option<String>,
    },
    /// Money transfer or red packet.
    Transfer {
        /// Amount transferred.
        amount: f64,
    },
    /// Couple-space activity.
    CoupleSpace {
        /// Activity label, when known.
        #[serde(default)]
        activity: Option<String>,
    },
    /// System or meta marker with no conversational content.
    System,
}

/// One entry of a time-ordered interaction log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    /// Producer of the interaction.
    pub actor: Actor,
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// What it carried.
    #[serde(flatten)]
    pub kind: InteractionKind,
}

impl Interaction {
    /// Plain text interaction.
    #[must_use]
    pub fn text(actor: Actor, timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            actor,
            timestamp,
            kind: InteractionKind::Text { text: text.into() },
        }
    }

    /// Text from the subject.
    #[must_use]
    pub fn subject(timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self::text(Actor::Subject, timestamp, text)
    }

    /// Text from the counterpart.
    #[must_use]
    pub fn counterpart(timestamp: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self::text(Actor::Counterpart, timestamp, text)
    }

    /// Textual rendering used for prompts.
    ///
    /// Non-text kinds become a short bracketed placeholder; system markers and
    /// blank text yield `None` and are skipped by every consumer.
    #[must_use]
    pub fn render_text(&self) -> Option<String> {
        match &self.kind {
            InteractionKind::Text { text } => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            InteractionKind::Photo => Some("[sent a photo]".to_string()),
            InteractionKind::Voice { transcript } => Some(
                transcript
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map_or_else(|| "[sent a voice message]".to_string(), ToString::to_string),
            ),
            InteractionKind::Location { name } => Some(format!(
                "[shared a location: {}]",
                name.as_deref().unwrap_or("unknown place")
            )),
            InteractionKind::Transfer { amount } => Some(format!("[transfer ¥{amount:.2}]")),
            InteractionKind::CoupleSpace { activity } => Some(format!(
                "[couple space: {}]",
                activity.as_deref().unwrap_or("interaction")
            )),
            InteractionKind::System => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(kind: InteractionKind) -> Interaction {
        Interaction {
            actor: Actor::Counterpart,
            timestamp: Utc::now(),
            kind,
        }
    }

    #[test]
    fn test_text_passes_through() {
        let interaction = at(InteractionKind::Text {
            text: " hello ".to_string(),
        });
        assert_eq!(interaction.render_text().as_deref(), Some("hello"));
    }

    #[test]
    fn test_non_text_kinds_become_placeholders() {
        assert_eq!(
            at(InteractionKind::Photo).render_text().as_deref(),
            Some("[sent a photo]")
        );
        assert_eq!(
            at(InteractionKind::Location {
                name: Some("Harbor".to_string())
            })
            .render_text()
            .as_deref(),
            Some("[shared a location: Harbor]")
        );
        assert_eq!(
            at(InteractionKind::Transfer { amount: 52.0 })
                .render_text()
                .as_deref(),
            Some("[transfer ¥52.00]")
        );
    }

    #[test]
    fn test_voice_prefers_transcript() {
        let voice = at(InteractionKind::Voice {
            transcript: Some("see you at eight".to_string()),
        });
        assert_eq!(voice.render_text().as_deref(), Some("see you at eight"));
        let silent = at(InteractionKind::Voice { transcript: None });
        assert_eq!(silent.render_text().as_deref(), Some("[sent a voice message]"));
    }

    #[test]
    fn test_system_and_blank_are_skipped() {
        assert!(at(InteractionKind::System).render_text().is_none());
        assert!(at(InteractionKind::Text {
            text: "   ".to_string()
        })
        .render_text()
        .is_none());
    }

    #[test]
    fn test_deserializes_tagged_kind() {
        let json = r#"{"actor":"subject","timestamp":"2024-05-01T10:00:00Z","kind":"text","text":"hi"}"#;
        let interaction: Interaction = serde_json::from_str(json).unwrap();
        assert_eq!(interaction.actor, Actor::Subject);
        assert_eq!(interaction.render_text().as_deref(), Some("hi"));
    }
}
