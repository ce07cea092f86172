//! Extraction prompts for the summarization service.
//!
//! Two shapes: conversation prompts embed numbered turns and ask for a single
//! JSON object (or `null`); activity prompts embed a list of plain summaries
//! and ask for a JSON array (or `[]`).

use crate::memory::ingest::turn_collector::DialogueTurn;

/// Output contract shared by both prompt shapes.
const FIELD_CONTRACT: &str = r#"Fields:
- "title": required, at most 10 words
- "summary": required, 40-80 words written from your own point of view
- "importance": optional, one of "high", "normal", "low" (default "normal")
- "tags": optional, a few short keywords
- "emotionalTone": optional, one of "positive", "neutral", "negative" (default "neutral")
- "facts": optional, short standalone statements worth remembering"#;

/// What to extract, in priority order.
const EXTRACTION_GUIDE: &str = "Keep only insight with long-term value: preferences and habits, \
personality traits, promises and plans, how the relationship is developing, and genuine emotional moments. \
Abstract over the details; skip small talk and step-by-step narration.";

/// Render a conversation extraction prompt.
#[must_use]
pub fn build_conversation_prompt(
    entity_name: &str,
    counterpart_label: &str,
    source_label: &str,
    turns: &[DialogueTurn],
    max_input_chars: usize,
) -> String {
    let dialogue = format_turns(entity_name, counterpart_label, turns, max_input_chars);

    format!(
        "You are {entity_name}. Below is your recent {source_label} with {counterpart_label}.\n\n\
         Dialogue:\n{dialogue}\n\
         {EXTRACTION_GUIDE}\n\n\
         Return exactly one JSON object:\n\
         {{\"title\": \"...\", \"summary\": \"...\", \"importance\": \"normal\", \"tags\": [\"...\"], \"emotionalTone\": \"neutral\", \"facts\": [\"...\"]}}\n\n\
         {FIELD_CONTRACT}\n\n\
         If nothing is worth remembering, return null.\n\
         Output only the JSON, with no explanation."
    )
}

/// Render a list-style extraction prompt from plain activity summaries.
///
/// Every item is embedded, oldest first; callers pick the window.
#[must_use]
pub fn build_activity_prompt(
    entity_name: &str,
    source_label: &str,
    items: &[String],
    max_input_chars: usize,
) -> String {
    let activity = format_items(items, max_input_chars);

    format!(
        "You are {entity_name}. Below is a record of your recent {source_label}.\n\n\
         Activity:\n{activity}\n\
         {EXTRACTION_GUIDE} Consider what these moments say about your mood, your motives, \
         and your relationship with the people involved.\n\n\
         Return a JSON array with 0 to 2 objects:\n\
         [{{\"title\": \"...\", \"summary\": \"...\", \"importance\": \"normal\", \"tags\": [\"...\"], \"emotionalTone\": \"neutral\"}}]\n\n\
         {FIELD_CONTRACT}\n\n\
         If nothing is worth remembering, return [].\n\
         Output only the JSON, with no explanation."
    )
}

fn format_turns(
    entity_name: &str,
    counterpart_label: &str,
    turns: &[DialogueTurn],
    max_chars: usize,
) -> String {
    let blocks = turns.iter().enumerate().map(|(index, turn)| {
        format!(
            "[Exchange {}]\n{counterpart_label}: {}\n{entity_name}: {}\n",
            index + 1,
            turn.counterpart_messages.join("\n"),
            turn.subject_reply
        )
    });
    push_within_budget(blocks, max_chars)
}

fn format_items(items: &[String], max_chars: usize) -> String {
    let blocks = items
        .iter()
        .enumerate()
        .map(|(index, item)| format!("{}. {item}\n", index + 1));
    push_within_budget(blocks, max_chars)
}

/// Concatenate blocks until the budget is hit, then cut with an ellipsis.
fn push_within_budget(blocks: impl Iterator<Item = String>, max_chars: usize) -> String {
    let mut output = String::new();
    let mut char_count = 0;

    for block in blocks {
        let block_len = block.chars().count();
        if char_count + block_len > max_chars {
            let remaining = max_chars.saturating_sub(char_count).saturating_sub(3);
            let truncated: String = block.chars().take(remaining).collect();
            output.push_str(&truncated);
            output.push_str("...\n");
            break;
        }
        output.push_str(&block);
        char_count += block_len;
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn turn(counterpart: &[&str], reply: &str) -> DialogueTurn {
        DialogueTurn {
            counterpart_messages: counterpart.iter().map(|s| (*s).to_string()).collect(),
            subject_reply: reply.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_conversation_prompt_numbers_turns_and_names_roles() {
        let turns = vec![turn(&["hi", "you there?"], "Yes!"), turn(&["bye"], "Night")];
        let prompt = build_conversation_prompt("Mira", "User", "private chat", &turns, 8000);

        assert!(prompt.starts_with("You are Mira."));
        assert!(prompt.contains("[Exchange 1]\nUser: hi\nyou there?\nMira: Yes!"));
        assert!(prompt.contains("[Exchange 2]"));
        assert!(prompt.contains("return null"));
        assert!(prompt.contains("Output only the JSON"));
    }

    #[test]
    fn test_activity_prompt_numbers_every_item() {
        let items: Vec<String> = (1..=3).map(|i| format!("event {i}")).collect();
        let prompt = build_activity_prompt("Mira", "forum activity", &items, 8000);

        assert!(prompt.contains("1. event 1\n"));
        assert!(prompt.contains("3. event 3\n"));
        assert!(prompt.contains("return []"));
    }

    #[test]
    fn test_budget_cuts_with_ellipsis() {
        let turns = vec![turn(&["a long opening message"], "a long reply as well")];
        let prompt = build_conversation_prompt("Mira", "User", "private chat", &turns, 20);
        assert!(prompt.contains("...\n"));
        assert!(!prompt.contains("a long reply as well"));
    }
}
