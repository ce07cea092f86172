//! Extraction engine orchestration.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::memory::core::config::{ExtractionConfig, WatermarkPolicy};
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::EntityRef;
use crate::memory::core::interaction::Interaction;
use crate::memory::core::kinds::{ExtractedBy, MemoryDomain, SourceDomain};
use crate::memory::core::record::{MemoryRecord, TimeRange};
use crate::memory::ingest::sources::{SourceAdapter, fetch_interactions};
use crate::memory::ingest::turn_collector::collect_dialogue_turns;
use crate::memory::prompt::prompt_builder::{build_activity_prompt, build_conversation_prompt};
use crate::memory::storage::counter::InteractionCounter;
use crate::memory::storage::kv_store::{KeyValueStore, SqliteKvStore};
use crate::memory::storage::memory_store::MemoryStore;
use crate::memory::storage::sqlite_memory_store::SqliteMemoryStore;
use crate::memory::storage::watermark::WatermarkStore;
use crate::memory::summarization::llm_summarizer::{LlmSummarizer, Summarizer};
use crate::memory::summarization::response_parser::{
    ExtractedMemory, parse_memory_array, parse_memory_object,
};

/// Outcome of one extraction pass for one entity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Records created per source domain; every domain is present.
    pub per_domain: BTreeMap<SourceDomain, usize>,
    /// Domains whose step failed and produced nothing.
    pub failed: BTreeSet<SourceDomain>,
}

impl ExtractionReport {
    /// Records created across all domains.
    #[must_use]
    pub fn total(&self) -> usize {
        self.per_domain.values().sum()
    }

    /// Records created for one domain.
    #[must_use]
    pub fn count(&self, domain: SourceDomain) -> usize {
        self.per_domain.get(&domain).copied().unwrap_or_default()
    }
}

/// Backend dependencies for the extraction engine.
pub struct ExtractionBackends {
    /// Access to the chat client's interaction logs.
    pub source: Arc<dyn SourceAdapter>,
    /// Text-generation service.
    pub summarizer: Arc<dyn Summarizer>,
    /// Where extracted records go.
    pub memory_store: Arc<dyn MemoryStore>,
    /// Counters, watermarks and settings.
    pub kv_store: Arc<dyn KeyValueStore>,
}

impl ExtractionBackends {
    /// Build `SQLite` stores and the Ollama summarizer from config.
    ///
    /// Both stores share one database file.
    ///
    /// # Errors
    /// Returns an error if any backend cannot be initialized.
    pub async fn sqlite(
        config: &ExtractionConfig,
        source: Arc<dyn SourceAdapter>,
    ) -> MemoryResult<Self> {
        let conn = Connection::open(&config.storage.sqlite_path).await?;
        let kv_store = Arc::new(
            SqliteKvStore::with_connection(conn.clone(), config.storage.kv_table.clone()).await?,
        );
        let memory_store = Arc::new(
            SqliteMemoryStore::with_connection(conn, config.storage.memory_table.clone()).await?,
        );
        let summarizer = Arc::new(LlmSummarizer::new(&config.llm)?);

        Ok(Self {
            source,
            summarizer,
            memory_store,
            kv_store,
        })
    }
}

/// What a domain step will summarize, prepared before the summarizer call.
struct DomainBatch {
    prompt: String,
    time_range: Option<TimeRange>,
    advance_to: DateTime<Utc>,
}

/// Incremental memory extraction over an entity's interaction logs.
pub struct ExtractionEngine {
    config: ExtractionConfig,
    source: Arc<dyn SourceAdapter>,
    summarizer: Arc<dyn Summarizer>,
    memory_store: Arc<dyn MemoryStore>,
    counter: InteractionCounter,
    watermarks: WatermarkStore,
}

impl ExtractionEngine {
    /// Create a new extraction engine.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ExtractionConfig, backends: ExtractionBackends) -> MemoryResult<Self> {
        config.validate()?;
        let counter = InteractionCounter::new(
            Arc::clone(&backends.kv_store),
            config.trigger.threshold,
        );
        let watermarks = WatermarkStore::new(backends.kv_store);

        Ok(Self {
            config,
            source: backends.source,
            summarizer: backends.summarizer,
            memory_store: backends.memory_store,
            counter,
            watermarks,
        })
    }

    /// Create a new engine using `SQLite` backends and the Ollama summarizer.
    ///
    /// # Errors
    /// Returns an error if backends cannot be initialized.
    pub async fn from_config(
        config: ExtractionConfig,
        source: Arc<dyn SourceAdapter>,
    ) -> MemoryResult<Self> {
        let backends = ExtractionBackends::sqlite(&config, source).await?;
        Self::new(config, backends)
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Store holding extracted and manual records.
    #[must_use]
    pub fn memory_store(&self) -> Arc<dyn MemoryStore> {
        Arc::clone(&self.memory_store)
    }

    /// Interaction counter and threshold settings.
    #[must_use]
    pub const fn counter(&self) -> &InteractionCounter {
        &self.counter
    }

    /// Per-domain watermarks.
    #[must_use]
    pub const fn watermarks(&self) -> &WatermarkStore {
        &self.watermarks
    }

    /// Count one interaction for `entity`.
    ///
    /// Returns `true` when the threshold was reached and a pass is due.
    ///
    /// # Errors
    /// Returns an error if counter storage fails.
    pub async fn record_interaction(&self, entity: &EntityRef) -> MemoryResult<bool> {
        self.counter.increment(&entity.id).await
    }

    /// Run a pass immediately, regardless of the counter, and reset it.
    pub async fn run_extraction_now(&self, entity: &EntityRef) -> ExtractionReport {
        if let Err(err) = self.counter.reset(&entity.id).await {
            warn!(entity_id = %entity.id, ?err, "Failed to reset interaction counter");
        }
        self.run_extraction_for_entity(entity).await
    }

    /// Run one extraction pass over all five source domains.
    ///
    /// Domains run in a fixed order. A failing domain is logged and counted
    /// as zero; later domains still run. Running twice without new
    /// interactions creates nothing.
    pub async fn run_extraction_for_entity(&self, entity: &EntityRef) -> ExtractionReport {
        info!(entity_id = %entity.id, "Starting memory extraction pass");
        let mut report = ExtractionReport::default();

        for domain in SourceDomain::ALL {
            let created = match self.extract_domain(entity, domain).await {
                Ok(created) => created,
                Err(err) => {
                    warn!(entity_id = %entity.id, domain = %domain, %err, "Extraction failed for domain");
                    report.failed.insert(domain);
                    0
                }
            };
            report.per_domain.insert(domain, created);
        }

        info!(
            entity_id = %entity.id,
            total = report.total(),
            failed = report.failed.len(),
            "Memory extraction pass finished"
        );
        report
    }

    /// Store a hand-written memory with `extracted_by = manual`.
    ///
    /// # Errors
    /// Returns an error if the title or summary is blank or storage fails.
    pub async fn add_manual_memory(
        &self,
        entity: &EntityRef,
        domain: MemoryDomain,
        memory: ExtractedMemory,
    ) -> MemoryResult<MemoryRecord> {
        let mut record = build_record(entity, domain, memory, ExtractedBy::Manual, None)?;
        record.id = self.memory_store.add(record.clone()).await?;
        debug!(entity_id = %entity.id, memory_id = %record.id, "Stored manual memory");
        Ok(record)
    }

    async fn extract_domain(&self, entity: &EntityRef, domain: SourceDomain) -> MemoryResult<usize> {
        let watermark = self.watermarks.get_watermark(&entity.id, domain).await?;
        let interactions = fetch_interactions(self.source.as_ref(), entity, domain).await?;
        let fresh: Vec<Interaction> = interactions
            .into_iter()
            .filter(|interaction| {
                interaction.timestamp.timestamp_millis() > watermark.timestamp_millis()
            })
            .collect();

        if fresh.is_empty() {
            debug!(entity_id = %entity.id, domain = %domain, "No new interactions");
            return Ok(0);
        }

        let batch = if domain.is_conversational() {
            self.conversation_batch(entity, domain, &fresh)
        } else {
            self.activity_batch(entity, domain, &fresh)
        };
        let Some(batch) = batch else {
            return Ok(0);
        };

        let advance_on_read = self.config.trigger.watermark_policy == WatermarkPolicy::AdvanceOnRead;
        if advance_on_read {
            self.watermarks
                .set_watermark(&entity.id, domain, batch.advance_to)
                .await?;
        }

        let reply = self.summarize(&batch.prompt).await?;
        let memories = if domain.is_conversational() {
            parse_memory_object(&reply).into_iter().collect()
        } else {
            parse_memory_array(&reply)
        };

        let memory_domain = domain.memory_domain();
        let mut created = 0;
        for memory in memories {
            let record = build_record(
                entity,
                memory_domain,
                memory,
                ExtractedBy::Auto,
                batch.time_range,
            )?;
            self.memory_store.add(record).await?;
            created += 1;
        }

        if !advance_on_read {
            self.watermarks
                .set_watermark(&entity.id, domain, batch.advance_to)
                .await?;
        }

        debug!(
            entity_id = %entity.id,
            domain = %domain,
            interactions = fresh.len(),
            created,
            "Domain extraction finished"
        );
        Ok(created)
    }

    /// Turns up to the last subject reply; trailing counterpart text waits
    /// for the next pass.
    fn conversation_batch(
        &self,
        entity: &EntityRef,
        domain: SourceDomain,
        fresh: &[Interaction],
    ) -> Option<DomainBatch> {
        let turns = collect_dialogue_turns(fresh);
        let Some(last) = turns.last() else {
            debug!(entity_id = %entity.id, domain = %domain, "No complete dialogue turns yet");
            return None;
        };
        let advance_to = last.timestamp;
        let time_range = TimeRange::covering(
            fresh
                .iter()
                .filter(|interaction| interaction.render_text().is_some())
                .map(|interaction| interaction.timestamp)
                .filter(|timestamp| *timestamp <= advance_to),
        );

        let prompt = build_conversation_prompt(
            &entity.name,
            &self.config.prompt.counterpart_label,
            domain.prompt_label(),
            &turns,
            self.config.prompt.max_input_chars,
        );
        Some(DomainBatch {
            prompt,
            time_range,
            advance_to,
        })
    }

    fn activity_batch(
        &self,
        entity: &EntityRef,
        domain: SourceDomain,
        fresh: &[Interaction],
    ) -> Option<DomainBatch> {
        let advance_to = fresh.iter().map(|interaction| interaction.timestamp).max()?;
        let rendered: Vec<(DateTime<Utc>, String)> = fresh
            .iter()
            .filter_map(|interaction| {
                interaction
                    .render_text()
                    .map(|text| (interaction.timestamp, text))
            })
            .collect();

        let start = rendered
            .len()
            .saturating_sub(self.config.prompt.max_activity_items);
        let embedded = &rendered[start..];
        let time_range = TimeRange::covering(embedded.iter().map(|(timestamp, _)| *timestamp));
        let items: Vec<String> = embedded.iter().map(|(_, text)| text.clone()).collect();

        // Nothing to summarize still moves the cursor past the silent entries.
        let prompt = if items.is_empty() {
            String::new()
        } else {
            build_activity_prompt(
                &entity.name,
                domain.prompt_label(),
                &items,
                self.config.prompt.max_input_chars,
            )
        };
        Some(DomainBatch {
            prompt,
            time_range,
            advance_to,
        })
    }

    async fn summarize(&self, prompt: &str) -> MemoryResult<String> {
        if prompt.is_empty() {
            return Ok(String::new());
        }
        let timeout = self.config.llm.timeout();
        tokio::time::timeout(timeout, self.summarizer.summarize(prompt))
            .await
            .map_err(|_| MemoryError::Timeout(timeout))?
    }
}

fn build_record(
    entity: &EntityRef,
    domain: MemoryDomain,
    memory: ExtractedMemory,
    extracted_by: ExtractedBy,
    time_range: Option<TimeRange>,
) -> MemoryResult<MemoryRecord> {
    Ok(
        MemoryRecord::new(domain, entity, memory.title, memory.summary, extracted_by)?
            .with_importance(memory.importance)
            .with_tone(memory.emotional_tone)
            .with_tags(memory.tags)
            .with_facts(memory.facts)
            .with_time_range(time_range),
    )
}
