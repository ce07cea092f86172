//! Configuration for the extraction pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Environment variable prefix read by [`ExtractionConfig::from_env`].
pub const ENV_PREFIX: &str = "ROLEPLAY_MEMORY_";

/// Top-level configuration for the extraction pipeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Trigger settings.
    pub trigger: TriggerConfig,
    /// Summarizer settings.
    pub llm: LlmConfig,
    /// Prompt construction settings.
    pub prompt: PromptConfig,
    /// Storage settings.
    pub storage: StorageConfig,
}

impl ExtractionConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> MemoryResult<()> {
        if self.trigger.threshold == 0 {
            return Err(MemoryError::InvalidConfig(
                "trigger.threshold must be > 0".to_string(),
            ));
        }

        if self.llm.timeout_seconds == 0 {
            return Err(MemoryError::InvalidConfig(
                "llm.timeout_seconds must be > 0".to_string(),
            ));
        }

        if self.prompt.max_activity_items == 0 {
            return Err(MemoryError::InvalidConfig(
                "prompt.max_activity_items must be > 0".to_string(),
            ));
        }

        if self.prompt.max_input_chars == 0 {
            return Err(MemoryError::InvalidConfig(
                "prompt.max_input_chars must be > 0".to_string(),
            ));
        }

        if let Some(base_url) = &self.llm.base_url {
            Url::parse(base_url)?;
        }

        for table in [&self.storage.kv_table, &self.storage.memory_table] {
            if !is_sql_identifier(table) {
                return Err(MemoryError::InvalidConfig(format!(
                    "storage table name is not a plain identifier: {table}"
                )));
            }
        }

        Ok(())
    }

    /// Defaults overlaid with `ROLEPLAY_MEMORY_*` environment variables.
    ///
    /// Recognized: `THRESHOLD`, `WATERMARK_POLICY`, `MODEL`, `OLLAMA_URL`,
    /// `TIMEOUT_SECONDS`, `SQLITE_PATH`.
    ///
    /// # Errors
    /// Returns an error if a variable is present but malformed, or if the
    /// resulting configuration fails validation.
    pub fn from_env() -> MemoryResult<Self> {
        let mut config = Self::default();

        if let Some(raw) = env_var("THRESHOLD") {
            config.trigger.threshold = raw.parse().map_err(|_| {
                MemoryError::InvalidConfig(format!("{ENV_PREFIX}THRESHOLD is not a number: {raw}"))
            })?;
        }
        if let Some(raw) = env_var("WATERMARK_POLICY") {
            config.trigger.watermark_policy = match raw.as_str() {
                "advance_on_read" => WatermarkPolicy::AdvanceOnRead,
                "advance_on_success" => WatermarkPolicy::AdvanceOnSuccess,
                other => {
                    return Err(MemoryError::InvalidConfig(format!(
                        "unknown watermark policy: {other}"
                    )));
                }
            };
        }
        if let Some(model) = env_var("MODEL") {
            config.llm.model = model;
        }
        if let Some(url) = env_var("OLLAMA_URL") {
            config.llm.base_url = Some(url);
        }
        if let Some(raw) = env_var("TIMEOUT_SECONDS") {
            config.llm.timeout_seconds = raw.parse().map_err(|_| {
                MemoryError::InvalidConfig(format!(
                    "{ENV_PREFIX}TIMEOUT_SECONDS is not a number: {raw}"
                ))
            })?;
        }
        if let Some(path) = env_var("SQLITE_PATH") {
            config.storage.sqlite_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Table names are spliced into SQL, so only `[A-Za-z_][A-Za-z0-9_]*` is accepted.
fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{suffix}"))
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// When a domain's watermark moves forward.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkPolicy {
    /// Advance as soon as the new interactions were read, even if the
    /// summarizer call then fails.
    AdvanceOnRead,
    /// Advance only when the summarizer answered (an empty or unparseable
    /// answer still counts); failed windows are retried on the next trigger.
    #[default]
    AdvanceOnSuccess,
}

/// Interaction-count trigger settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Default interactions per extraction, used until an operator stores one.
    pub threshold: u64,
    /// Watermark advance policy.
    pub watermark_policy: WatermarkPolicy,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            threshold: 15,
            watermark_policy: WatermarkPolicy::default(),
        }
    }
}

/// Completion model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama completion model name.
    pub model: String,
    /// Temperature for generation.
    pub temperature: f64,
    /// Optional custom base URL.
    pub base_url: Option<String>,
    /// Deadline for one summarization call.
    pub timeout_seconds: u64,
}

impl LlmConfig {
    /// Deadline as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "ministral-3:8b-instruct-2512-q8_0".to_string(),
            temperature: 0.3,
            base_url: None,
            timeout_seconds: 60,
        }
    }
}

/// Prompt construction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptConfig {
    /// How the counterpart is named in prompts.
    pub counterpart_label: String,
    /// Maximum activity summaries embedded in list-style prompts (most recent kept).
    pub max_activity_items: usize,
    /// Character budget for the embedded interaction text.
    pub max_input_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            counterpart_label: "User".to_string(),
            max_activity_items: 10,
            max_input_chars: 8000,
        }
    }
}

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Key-value table (counters, watermarks, settings).
    pub kv_table: String,
    /// Memory record table.
    pub memory_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("memory.sqlite"),
            kv_table: "memory_kv".to_string(),
            memory_table: "memory_records".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ExtractionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trigger.threshold, 15);
        assert_eq!(
            config.trigger.watermark_policy,
            WatermarkPolicy::AdvanceOnSuccess
        );
    }

    #[test]
    fn test_zero_threshold_is_rejected() {
        let mut config = ExtractionConfig::default();
        config.trigger.threshold = 0;
        assert!(matches!(
            config.validate(),
            Err(MemoryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bad_base_url_is_rejected() {
        let mut config = ExtractionConfig::default();
        config.llm.base_url = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(MemoryError::Url(_))));
    }

    #[test]
    fn test_table_names_must_be_identifiers() {
        let mut config = ExtractionConfig::default();
        config.storage.memory_table = "records; DROP TABLE x".to_string();
        assert!(config.validate().is_err());
        config.storage.memory_table = "_records2".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_serializes_snake_case() {
        let json = serde_json::to_string(&WatermarkPolicy::AdvanceOnRead).unwrap();
        assert_eq!(json, "\"advance_on_read\"");
    }
}
