//! Defensive parsing of summarizer replies.
//!
//! Accepted reply shapes, checked in order:
//! 1. a Markdown fence (```` ```json ```` or bare ```` ``` ````) whose body is
//!    parsed instead of the whole reply,
//! 2. an empty-result sentinel: empty text, `null` or `[]`,
//! 3. a JSON object or array embedded in prose. Object mode looks from the
//!    first `{`, array mode from the first `[`, each to its matching close,
//!    ignoring brackets inside string literals. When that slice is missing,
//!    does not decode or holds no valid memory, the other bracket is tried.
//!
//! Anything else is rejected. Rejection and the empty sentinel both produce
//! the empty result, but only rejection is logged as a warning. Nothing here
//! returns an error.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::memory::core::kinds::{EmotionalTone, Importance};

/// Characters of a rejected reply kept in the log line.
const LOG_PREVIEW_CHARS: usize = 200;

static FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)\s*```").ok());

/// A memory candidate proposed by the summarizer.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedMemory {
    /// Short label.
    pub title: String,
    /// Free-text synopsis.
    pub summary: String,
    /// Importance, `Normal` when absent or unrecognized.
    pub importance: Importance,
    /// Keyword tags, empty when absent.
    pub tags: Vec<String>,
    /// Tone, `Neutral` when absent or unrecognized.
    pub emotional_tone: EmotionalTone,
    /// Standalone facts, empty when absent.
    pub facts: Vec<String>,
}

/// JSON container a parse mode looks for first.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Container {
    /// `{ ... }`, preferred by conversation domains.
    Object,
    /// `[ ... ]`, preferred by activity domains.
    Array,
}

impl Container {
    const fn brackets(self) -> (char, char) {
        match self {
            Self::Object => ('{', '}'),
            Self::Array => ('[', ']'),
        }
    }

    const fn other(self) -> Self {
        match self {
            Self::Object => Self::Array,
            Self::Array => Self::Object,
        }
    }

    /// Slice of `body` from the first opening bracket to its match.
    fn locate(self, body: &str) -> Option<ResponseShape<'_>> {
        let (open, close) = self.brackets();
        let slice = enclosed(body, open, close)?;
        Some(match self {
            Self::Object => ResponseShape::Object(slice),
            Self::Array => ResponseShape::Array(slice),
        })
    }
}

/// How a reply was classified before JSON decoding.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResponseShape<'a> {
    /// One of the empty-result sentinels.
    Empty,
    /// Slice holding a candidate JSON object.
    Object(&'a str),
    /// Slice holding a candidate JSON array.
    Array(&'a str),
    /// No JSON could be located.
    Unrecognized,
}

/// Remove a Markdown code fence, keeping its body.
#[must_use]
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    FENCE
        .as_ref()
        .and_then(|fence| fence.captures(trimmed))
        .and_then(|caps| caps.get(1))
        .map_or(trimmed, |body| body.as_str().trim())
}

/// Classify a reply, looking for the `preferred` container first.
#[must_use]
pub fn classify_response(raw: &str, preferred: Container) -> ResponseShape<'_> {
    let body = strip_code_fence(raw);
    if is_empty_sentinel(body) {
        return ResponseShape::Empty;
    }
    preferred
        .locate(body)
        .or_else(|| preferred.other().locate(body))
        .unwrap_or(ResponseShape::Unrecognized)
}

/// Parse a single-object reply (conversation domains).
///
/// Returns `None` for the empty sentinel and for anything unusable. When the
/// reply is an array, its first valid element is taken.
#[must_use]
pub fn parse_memory_object(raw: &str) -> Option<ExtractedMemory> {
    let Some(values) = decode_candidates(raw, Container::Object) else {
        debug!("Summarizer returned the empty result");
        return None;
    };
    if values.is_empty() {
        reject(raw, "no JSON object found");
        return None;
    }

    let memory = values.iter().find_map(|value| match value {
        Value::Array(items) => items.iter().find_map(memory_from_value),
        other => memory_from_value(other),
    });
    if memory.is_none() {
        reject(raw, "missing title or summary");
    }
    memory
}

/// Parse a list reply (activity domains).
///
/// Invalid elements are dropped one by one; a lone object counts as a
/// one-element list.
#[must_use]
pub fn parse_memory_array(raw: &str) -> Vec<ExtractedMemory> {
    let Some(values) = decode_candidates(raw, Container::Array) else {
        debug!("Summarizer returned the empty result");
        return Vec::new();
    };
    if values.is_empty() {
        reject(raw, "no JSON array found");
        return Vec::new();
    }

    for value in values {
        let candidates = match value {
            Value::Array(items) => items,
            other => vec![other],
        };
        let total = candidates.len();
        let memories: Vec<ExtractedMemory> =
            candidates.iter().filter_map(memory_from_value).collect();
        if memories.len() < total {
            debug!(
                dropped = total - memories.len(),
                kept = memories.len(),
                "Dropped invalid memory candidates"
            );
        }
        if !memories.is_empty() {
            return memories;
        }
    }
    Vec::new()
}

fn is_empty_sentinel(body: &str) -> bool {
    matches!(body, "" | "null" | "[]")
}

/// Decoded JSON slices, preferred container first.
///
/// `None` means the reply was an empty-result sentinel.
fn decode_candidates(raw: &str, preferred: Container) -> Option<Vec<Value>> {
    let body = strip_code_fence(raw);
    if is_empty_sentinel(body) {
        return None;
    }

    let mut values = Vec::new();
    for container in [preferred, preferred.other()] {
        let Some(ResponseShape::Object(slice) | ResponseShape::Array(slice)) =
            container.locate(body)
        else {
            continue;
        };
        match serde_json::from_str(slice) {
            Ok(value) => values.push(value),
            Err(err) => debug!(%err, ?container, "Reply slice is not valid JSON"),
        }
    }
    Some(values)
}

fn reject(raw: &str, reason: &str) {
    let preview: String = raw.chars().take(LOG_PREVIEW_CHARS).collect();
    warn!(reason, raw = %preview, "Rejected summarizer reply");
}

/// Slice from the first `open` to its matching `close`.
///
/// Falls back to the last `close` when the brackets never balance, so a
/// slightly malformed reply still reaches the JSON decoder.
fn enclosed(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == open {
            depth += 1;
        } else if ch == close {
            depth -= 1;
            if depth == 0 {
                return Some(&text[start..start + offset + ch.len_utf8()]);
            }
        }
    }

    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn memory_from_value(value: &Value) -> Option<ExtractedMemory> {
    let object = value.as_object()?;
    let title = non_empty_str(object.get("title"))?;
    let summary = non_empty_str(object.get("summary"))?;

    let importance = object
        .get("importance")
        .and_then(Value::as_str)
        .map_or_else(Importance::default, Importance::parse_lossy);
    let emotional_tone = object
        .get("emotionalTone")
        .or_else(|| object.get("emotional_tone"))
        .and_then(Value::as_str)
        .map_or_else(EmotionalTone::default, EmotionalTone::parse_lossy);

    Some(ExtractedMemory {
        title,
        summary,
        importance,
        tags: string_list(object.get("tags")),
        emotional_tone,
        facts: string_list(object.get("facts")),
    })
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Accept a JSON list of strings or a single comma-separated string.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(ToString::to_string)
            .collect(),
        Some(Value::String(joined)) => joined
            .split([',', '，'])
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(ToString::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENING: &str = r#"{"title":"Evening check-in","summary":"We talked about the day.","tags":["mood"],"emotionalTone":"positive"}"#;

    #[test]
    fn test_empty_sentinels_yield_empty_result() {
        for raw in ["", "null", "[]", "  null  ", "```json\n[]\n```"] {
            assert_eq!(
                classify_response(raw, Container::Object),
                ResponseShape::Empty,
                "{raw:?}"
            );
            assert!(parse_memory_object(raw).is_none());
            assert!(parse_memory_array(raw).is_empty());
        }
    }

    #[test]
    fn test_garbage_is_rejected_softly() {
        assert_eq!(
            classify_response("not json at all", Container::Array),
            ResponseShape::Unrecognized
        );
        assert!(parse_memory_object("not json at all").is_none());
        assert!(parse_memory_array("not json at all").is_empty());
    }

    #[test]
    fn test_bare_object() {
        let memory = parse_memory_object(EVENING).unwrap();
        assert_eq!(memory.title, "Evening check-in");
        assert_eq!(memory.tags, vec!["mood".to_string()]);
        assert_eq!(memory.emotional_tone, EmotionalTone::Positive);
        assert_eq!(memory.importance, Importance::Normal);
        assert!(memory.facts.is_empty());
    }

    #[test]
    fn test_fenced_object_with_prose() {
        let raw = format!("Sure! Here it is:\n```json\n{EVENING}\n```\nHope that helps.");
        assert_eq!(strip_code_fence(&raw), EVENING);
        let memory = parse_memory_object(&raw).unwrap();
        assert_eq!(memory.summary, "We talked about the day.");
    }

    #[test]
    fn test_bare_fence_without_language() {
        let raw = format!("```\n{EVENING}\n```");
        assert!(parse_memory_object(&raw).is_some());
    }

    #[test]
    fn test_object_in_prose_without_fence() {
        let raw = format!("Memory follows {EVENING} -- end {{of reply}}");
        assert_eq!(
            classify_response(&raw, Container::Object),
            ResponseShape::Object(EVENING)
        );
    }

    #[test]
    fn test_object_mode_skips_bracketed_prose() {
        let raw = "Here is the memory for [Mika]:\n{\"title\":\"T\",\"summary\":\"S\"}";
        assert_eq!(
            classify_response(raw, Container::Object),
            ResponseShape::Object(r#"{"title":"T","summary":"S"}"#)
        );
        let memory = parse_memory_object(raw).unwrap();
        assert_eq!(memory.title, "T");
        assert_eq!(memory.summary, "S");
    }

    #[test]
    fn test_array_mode_skips_braced_prose() {
        let raw = "Based on the feed {mostly casual}, here you go: [{\"title\":\"T\",\"summary\":\"S\"}]";
        assert_eq!(
            classify_response(raw, Container::Array),
            ResponseShape::Array(r#"[{"title":"T","summary":"S"}]"#)
        );
        let memories = parse_memory_array(raw);
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].title, "T");
    }

    #[test]
    fn test_other_bracket_is_tried_when_preferred_slice_is_unusable() {
        let raw = r#"Note {draft} then [{"title":"A","summary":"kept"}]"#;
        assert_eq!(parse_memory_object(raw).unwrap().title, "A");

        let raw = r#"See [1] for context. {"title":"B","summary":"kept"}"#;
        let memories = parse_memory_array(raw);
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].title, "B");
    }

    #[test]
    fn test_braces_inside_strings_do_not_end_object() {
        let raw = r#"{"title":"Set {notation}","summary":"She wrote } on the board."} trailing }"#;
        let memory = parse_memory_object(raw).unwrap();
        assert_eq!(memory.title, "Set {notation}");
    }

    #[test]
    fn test_missing_summary_is_rejected() {
        assert!(parse_memory_object(r#"{"title":"Only a title"}"#).is_none());
        assert!(parse_memory_object(r#"{"title":"","summary":"x"}"#).is_none());
    }

    #[test]
    fn test_array_drops_invalid_elements() {
        let raw = r#"[{"title":"A","summary":"first"},{"title":"B"},{"title":"C","summary":"third","importance":"high"}]"#;
        let memories = parse_memory_array(raw);
        assert_eq!(memories.len(), 2);
        assert_eq!(memories[1].importance, Importance::High);
    }

    #[test]
    fn test_array_accepts_lone_object() {
        let memories = parse_memory_array(EVENING);
        assert_eq!(memories.len(), 1);
    }

    #[test]
    fn test_object_mode_takes_first_valid_array_element() {
        let raw = r#"[{"title":"bad"},{"title":"Good","summary":"kept"}]"#;
        let memory = parse_memory_object(raw).unwrap();
        assert_eq!(memory.title, "Good");
    }

    #[test]
    fn test_optional_fields_default_and_tolerate_odd_values() {
        let raw = r#"{"title":"T","summary":"S","importance":"urgent-ish","emotionalTone":42,"tags":"walks, coffee","facts":["Likes rain", ""]}"#;
        let memory = parse_memory_object(raw).unwrap();
        assert_eq!(memory.importance, Importance::Normal);
        assert_eq!(memory.emotional_tone, EmotionalTone::Neutral);
        assert_eq!(memory.tags, vec!["walks".to_string(), "coffee".to_string()]);
        assert_eq!(memory.facts, vec!["Likes rain".to_string()]);
    }

    #[test]
    fn test_truncated_json_is_rejected() {
        let raw = r#"[{"title":"A","summary":"cut off"#;
        assert!(parse_memory_array(raw).is_empty());
    }
}
