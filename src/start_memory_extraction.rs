//! Startup helpers for the one-shot extraction binary.
//!
//! Loads an exported interaction log, runs a pass against the configured
//! Ollama endpoint and persists the resulting memories to `SQLite`.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};

use crate::memory::core::config::ExtractionConfig;
use crate::memory::engine::{ExtractionEngine, ExtractionReport};
use crate::memory::ingest::InteractionLog;

/// Run one extraction pass for the log named on the command line.
///
/// # Returns
/// `ExitCode::SUCCESS` when the pass ran, `1` on setup failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting roleplay memory extraction v{}", env!("CARGO_PKG_VERSION"));

    let Some(log_path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        tracing::error!("Usage: roleplay-memory <interaction-log.json>");
        return ExitCode::from(2);
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match rt.block_on(extract_from_file(&log_path)) {
        Ok(report) if report.failed.is_empty() => ExitCode::SUCCESS,
        Ok(report) => {
            tracing::warn!(failed = ?report.failed, "Some domains failed; they will be retried next pass");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Extraction failed: {e:#}");
            ExitCode::from(1)
        }
    }
}

/// Load `log_path`, run a pass for its entity and log the store totals.
///
/// # Errors
/// Returns an error if configuration, the log or storage setup fails.
pub async fn extract_from_file(log_path: &Path) -> Result<ExtractionReport> {
    let config = ExtractionConfig::from_env().context("invalid configuration")?;
    tracing::info!(
        model = %config.llm.model,
        sqlite = %config.storage.sqlite_path.display(),
        "Loaded configuration"
    );

    let log = InteractionLog::load(log_path)
        .await
        .with_context(|| format!("failed to read {}", log_path.display()))?;
    let entity = log
        .entity
        .clone()
        .ok_or_else(|| anyhow!("interaction log has no \"entity\" section"))?;

    let engine = ExtractionEngine::from_config(config, Arc::new(log))
        .await
        .context("failed to initialize extraction backends")?;

    let report = engine.run_extraction_now(&entity).await;
    for (domain, created) in &report.per_domain {
        tracing::info!(domain = %domain, created, "Domain result");
    }

    let stats = engine
        .memory_store()
        .stats()
        .await
        .context("failed to read memory statistics")?;
    tracing::info!(
        entity_id = %entity.id,
        created = report.total(),
        stored = stats.total,
        high_importance = stats.high_importance,
        "Extraction pass complete"
    );

    Ok(report)
}
