//! Prompt construction for extraction calls.

pub mod prompt_builder;

pub use prompt_builder::{build_activity_prompt, build_conversation_prompt};
