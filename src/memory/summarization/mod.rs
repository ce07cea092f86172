//! Summarization client and reply parsing.
//!
//! The client sends one extraction prompt to the text-generation service;
//! the parser turns its untrusted reply into typed memory candidates.

pub mod llm_summarizer;
pub mod response_parser;

pub use llm_summarizer::{LlmSummarizer, SummarizeFuture, Summarizer};
pub use response_parser::{
    Container, ExtractedMemory, ResponseShape, classify_response, parse_memory_array, parse_memory_object,
    strip_code_fence,
};
