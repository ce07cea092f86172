//! Groups a flat interaction log into dialogue turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::memory::core::interaction::{Actor, Interaction};

/// Placeholder for the counterpart side of a subject-initiated turn.
pub const UNPROMPTED_MARKER: &str = "(unprompted)";

/// One exchange: what the counterpart said, then the subject's reply.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DialogueTurn {
    /// Counterpart texts accumulated since the previous reply.
    pub counterpart_messages: Vec<String>,
    /// The subject reply that closed the turn.
    pub subject_reply: String,
    /// Time of the closing reply.
    pub timestamp: DateTime<Utc>,
}

impl DialogueTurn {
    /// True when the subject spoke without a preceding counterpart message.
    #[must_use]
    pub fn is_unprompted(&self) -> bool {
        self.counterpart_messages.len() == 1 && self.counterpart_messages[0] == UNPROMPTED_MARKER
    }
}

/// Collect turns from a time-ordered log.
///
/// Interactions with no derivable text are skipped. Counterpart text is
/// accumulated; each subject text closes a turn, using [`UNPROMPTED_MARKER`]
/// when nothing was pending. Counterpart text left after the last subject
/// reply does not form a turn.
#[must_use]
pub fn collect_dialogue_turns(interactions: &[Interaction]) -> Vec<DialogueTurn> {
    let mut turns = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    for interaction in interactions {
        let Some(text) = interaction.render_text() else {
            continue;
        };

        match interaction.actor {
            Actor::Counterpart => pending.push(text),
            Actor::Subject => {
                let counterpart_messages = if pending.is_empty() {
                    vec![UNPROMPTED_MARKER.to_string()]
                } else {
                    std::mem::take(&mut pending)
                };
                turns.push(DialogueTurn {
                    counterpart_messages,
                    subject_reply: text,
                    timestamp: interaction.timestamp,
                });
            }
        }
    }

    debug!(
        interactions = interactions.len(),
        turns = turns.len(),
        trailing = pending.len(),
        "Collected dialogue turns"
    );

    turns
}
