//! Background extraction worker.
//!
//! Triggers are queued without waiting; a worker task starts one extraction
//! pass per queued entity. Passes run as separate tasks, so two passes for
//! the same entity can overlap when triggers arrive quickly.

use std::sync::Arc;

use tokio::sync::{Notify, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::EntityRef;
use crate::memory::engine::core::{ExtractionEngine, ExtractionReport};

/// Queue-fed worker running extraction passes off the caller's path.
pub struct BackgroundExtractor {
    engine: Arc<ExtractionEngine>,
    sender: mpsc::UnboundedSender<EntityRef>,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl BackgroundExtractor {
    /// Spawn the worker on the current runtime.
    #[must_use]
    pub fn spawn(engine: Arc<ExtractionEngine>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(run(
            Arc::clone(&engine),
            receiver,
            Arc::clone(&shutdown),
        ));

        Self {
            engine,
            sender,
            shutdown,
            handle,
        }
    }

    /// Queue a pass for `entity` and return immediately.
    ///
    /// # Errors
    /// Returns an error if the worker has stopped.
    pub fn submit(&self, entity: EntityRef) -> MemoryResult<()> {
        self.sender
            .send(entity)
            .map_err(|_| MemoryError::WorkerStopped)
    }

    /// Count one interaction and queue a pass when the threshold is reached.
    ///
    /// Returns whether a pass was queued.
    ///
    /// # Errors
    /// Returns an error if counter storage fails or the worker has stopped.
    pub async fn record_interaction(&self, entity: &EntityRef) -> MemoryResult<bool> {
        let triggered = self.engine.record_interaction(entity).await?;
        if triggered {
            self.submit(entity.clone())?;
        }
        Ok(triggered)
    }

    /// Stop the worker and wait for running passes to finish.
    ///
    /// Triggers queued before the call are still started.
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(err) = self.handle.await {
            warn!(?err, "Background extractor task failed");
        }
    }
}

async fn run(
    engine: Arc<ExtractionEngine>,
    mut receiver: mpsc::UnboundedReceiver<EntityRef>,
    shutdown: Arc<Notify>,
) {
    info!("Starting background extraction worker");
    let mut passes: JoinSet<(String, ExtractionReport)> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            queued = receiver.recv() => {
                let Some(entity) = queued else {
                    debug!("Trigger queue closed");
                    break;
                };
                let engine = Arc::clone(&engine);
                passes.spawn(async move {
                    let report = engine.run_extraction_for_entity(&entity).await;
                    (entity.id, report)
                });
            }
            Some(finished) = passes.join_next(), if !passes.is_empty() => {
                log_pass(finished);
            }
            () = shutdown.notified() => {
                info!("Background extraction worker shutting down");
                break;
            }
        }
    }

    while let Some(finished) = passes.join_next().await {
        log_pass(finished);
    }
}

fn log_pass(finished: Result<(String, ExtractionReport), tokio::task::JoinError>) {
    match finished {
        Ok((entity_id, report)) => {
            info!(
                entity_id,
                total = report.total(),
                failed = report.failed.len(),
                "Background extraction pass completed"
            );
        }
        Err(err) => warn!(?err, "Background extraction pass panicked"),
    }
}
