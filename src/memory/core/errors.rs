//! Error types for the memory subsystem.

use std::time::Duration;

use thiserror::Error;

/// Memory subsystem error type.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Invalid or corrupt memory record.
    #[error("invalid memory record: {0}")]
    InvalidRecord(String),
    /// Update or lookup for an id the store does not hold.
    #[error("memory record not found: {0}")]
    RecordNotFound(String),
    /// A source adapter could not produce its interaction log.
    #[error("source adapter failed: {0}")]
    Source(String),
    /// The summarization service returned an unusable reply.
    #[error("summarizer failed: {0}")]
    Summarizer(String),
    /// The summarization call exceeded its deadline.
    #[error("summarizer timed out after {0:?}")]
    Timeout(Duration),
    /// The background extractor no longer accepts triggers.
    #[error("background extractor has stopped")]
    WorkerStopped,
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// HTTP client error from Rig.
    #[error("http client error: {0}")]
    HttpClient(#[from] rig::http_client::Error),
    /// Completion error.
    #[error("completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
