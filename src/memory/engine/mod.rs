//! Extraction engine orchestration module.

pub mod background;
pub mod core;

pub use background::BackgroundExtractor;
pub use self::core::{ExtractionBackends, ExtractionEngine, ExtractionReport};
