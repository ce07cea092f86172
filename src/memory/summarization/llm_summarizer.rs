//! Summarization client for extraction prompts.
//!
//! One call per prompt, no retry. Deadlines are the caller's business.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client as ReqwestClient;
use rig::client::CompletionClient;
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use rig::providers::ollama;
use tracing::debug;

use crate::memory::core::config::LlmConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};

/// Boxed future type for summarizer calls.
pub type SummarizeFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Preamble sent with every extraction prompt.
const EXTRACTION_PREAMBLE: &str = "You turn roleplay interaction logs into long-term memories. \
You answer with JSON only and never add commentary.";

/// External text-generation service.
pub trait Summarizer: Send + Sync {
    /// Send one prompt and return the raw reply text.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-success response.
    fn summarize<'a>(&'a self, prompt: &'a str) -> SummarizeFuture<'a, MemoryResult<String>>;
}

/// Ollama-backed summarizer.
pub struct LlmSummarizer {
    model: ollama::CompletionModel,
    temperature: f64,
}

impl LlmSummarizer {
    /// Create a new LLM summarizer.
    ///
    /// # Errors
    /// Returns an error if the Ollama client cannot be built.
    pub fn new(config: &LlmConfig) -> MemoryResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(rig::client::Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder.build().map_err(MemoryError::from)?;
        let model = client.completion_model(config.model.clone());

        Ok(Self {
            model,
            temperature: config.temperature,
        })
    }
}

impl Summarizer for LlmSummarizer {
    fn summarize<'a>(&'a self, prompt: &'a str) -> SummarizeFuture<'a, MemoryResult<String>> {
        Box::pin(async move {
            debug!(prompt_chars = prompt.chars().count(), "Sending extraction prompt");

            let request = self
                .model
                .completion_request(prompt.to_string())
                .preamble(EXTRACTION_PREAMBLE.to_string())
                .temperature(self.temperature)
                .build();

            let response = self.model.completion(request).await?;
            Ok(extract_text(&response.choice))
        })
    }
}

/// Extract text from assistant response.
fn extract_text(choice: &rig::OneOrMany<AssistantContent>) -> String {
    let mut out = String::new();
    for content in choice.iter() {
        if let AssistantContent::Text(text) = content {
            out.push_str(&text.text);
        }
    }
    out
}
