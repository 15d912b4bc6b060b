//! The poll/summarize/persist loop

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::state::{AgentPhase, CycleOutcome, ParseFailureTracker};
use crate::config::AgentConfig;
use crate::ingest::{self, Candidate, InputDocument};
use crate::report::Reporter;
use crate::shutdown::ShutdownToken;
use crate::state::{content_hash, hash_bytes, FileRecord, StateStore, SummaryMetadata, SummaryState};
use crate::summarizer::{Summarizer, GENERATION_FALLBACK};

/// Metadata key holding the last model-written description while the stored
/// one is the fallback text
const LAST_GENERATED_KEY: &str = "last_generated_description";

/// Latest description the model actually wrote, if any
fn last_generated(state: &SummaryState) -> Option<&str> {
    let is_generated = |d: &str| !d.trim().is_empty() && d != GENERATION_FALLBACK;

    let current = state.overall_ai_description.as_str();
    if is_generated(current) {
        return Some(current);
    }
    state
        .summary_metadata
        .extra
        .get(LAST_GENERATED_KEY)
        .and_then(|v| v.as_str())
        .filter(|d| is_generated(d))
}

/// Long-running consolidation agent
pub struct Agent {
    config: AgentConfig,
    model: String,
    store: StateStore,
    summarizer: Summarizer,
    reporter: Arc<dyn Reporter>,
    state: Option<SummaryState>,
    /// In-memory state newer than the file on disk
    unsaved: bool,
    failures: ParseFailureTracker,
    phase: AgentPhase,
}

impl Agent {
    /// Create the agent, making sure the monitored directory exists and
    /// loading any persisted state.
    pub fn new(
        config: AgentConfig,
        model: impl Into<String>,
        summarizer: Summarizer,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self> {
        fs::create_dir_all(&config.monitor_dir).with_context(|| {
            format!("Failed to create monitor directory {}", config.monitor_dir.display())
        })?;

        let store = StateStore::new(&config.output_file);
        let state = store.load();
        let failures = ParseFailureTracker::new(config.max_parse_attempts);

        Ok(Self {
            config,
            model: model.into(),
            store,
            summarizer,
            reporter,
            state,
            unsaved: false,
            failures,
            phase: AgentPhase::Idle,
        })
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    pub fn state(&self) -> Option<&SummaryState> {
        self.state.as_ref()
    }

    /// Run one cycle immediately, then one per poll interval until
    /// `shutdown` is cancelled. Ends by displaying the final state.
    pub async fn run(&mut self, shutdown: &ShutdownToken) {
        let interval = self.config.poll_interval();
        self.phase = AgentPhase::Running;
        info!(
            dir = %self.config.monitor_dir.display(),
            output = %self.store.path().display(),
            model = %self.model,
            interval_secs = interval.as_secs(),
            "Agent started"
        );
        self.reporter.started(
            &self.config.monitor_dir,
            self.store.path(),
            &self.model,
            interval,
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            if let Err(e) = self.run_cycle(shutdown).await {
                warn!(error = %format!("{e:#}"), "Cycle failed");
                self.reporter.cycle_failed(&e);
            }

            if shutdown.is_cancelled() {
                break;
            }

            self.phase = AgentPhase::Sleeping;
            self.reporter.waiting(interval);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.cancelled() => break,
            }
            self.phase = AgentPhase::Running;
        }

        self.stop();
    }

    /// Single cycle followed by the final-state display
    pub async fn run_once(&mut self, shutdown: &ShutdownToken) -> Result<CycleOutcome> {
        self.phase = AgentPhase::Running;
        let outcome = self.run_cycle(shutdown).await;
        self.stop();
        outcome
    }

    /// Scan, summarize and persist whatever is new
    pub async fn run_cycle(&mut self, shutdown: &ShutdownToken) -> Result<CycleOutcome> {
        let outcome = self.cycle(shutdown).await;
        self.phase = AgentPhase::Running;
        if let Ok(outcome) = &outcome {
            debug!(?outcome, "Cycle finished");
        }
        outcome
    }

    async fn cycle(&mut self, shutdown: &ShutdownToken) -> Result<CycleOutcome> {
        self.reporter.cycle_started();

        if self.unsaved {
            self.persist();
        }

        if !self.summarizer.generator().is_available().await {
            warn!("Language model unavailable, skipping cycle");
            self.reporter.collaborator_unavailable();
            return Ok(CycleOutcome::CollaboratorUnavailable);
        }

        self.phase = AgentPhase::Scanning;
        let candidates = self.new_candidates()?;
        if candidates.is_empty() {
            self.reporter.no_new_files();
            return Ok(CycleOutcome::NoNewFiles);
        }
        info!(count = candidates.len(), "Found new files");
        self.reporter.new_files(candidates.len());

        let (batch, texts) = self.read_batch(&candidates, shutdown);
        if texts.is_empty() {
            info!(files = batch.len(), "No text extracted, state unchanged");
            self.reporter.no_items();
            return Ok(CycleOutcome::NoItems { files: batch.len() });
        }

        self.phase = AgentPhase::Processing;
        self.reporter.generating(texts.len());
        let previous = self
            .state
            .as_ref()
            .and_then(last_generated)
            .map(str::to_string);
        let summary = self
            .summarizer
            .generate(previous.as_deref(), &texts, &self.model)
            .await;
        self.reporter.generated(&summary);

        self.phase = AgentPhase::Persisting;
        let mut metadata = SummaryMetadata::now(&self.model, &self.config.monitor_dir);
        if let Some(state) = &self.state {
            metadata.extra = state.summary_metadata.extra.clone();
        }
        match previous.filter(|_| summary.degraded) {
            Some(previous) => {
                debug!("Keeping the last generated description alongside the fallback");
                metadata
                    .extra
                    .insert(LAST_GENERATED_KEY.to_string(), serde_json::Value::String(previous));
            }
            None => {
                metadata.extra.remove(LAST_GENERATED_KEY);
            }
        }
        let next = SummaryState::merged(self.state.as_ref(), &batch, summary.text, metadata);
        self.state = Some(next);
        self.unsaved = true;
        self.persist();

        Ok(CycleOutcome::Processed {
            files: batch.len(),
            items: texts.len(),
            degraded: summary.degraded,
        })
    }

    /// Unprocessed files that have not been set aside
    fn new_candidates(&self) -> Result<Vec<Candidate>> {
        let found = ingest::scan(
            &self.config.monitor_dir,
            &self.config.extension,
            self.store.path(),
        )?;

        let candidates = ingest::select_new(found, self.state.as_ref())
            .into_iter()
            .filter(|c| {
                let hash = content_hash(&c.path).ok();
                let set_aside = self.failures.is_set_aside(&c.key, hash.as_deref());
                if set_aside {
                    debug!(
                        file = %c.key,
                        attempts = self.failures.attempts(&c.key),
                        "Skipping file set aside after repeated parse failures"
                    );
                }
                !set_aside
            })
            .collect();
        Ok(candidates)
    }

    /// Read and parse candidates until done or shutdown is requested.
    ///
    /// Returns the files to commit and the text fragments they hold.
    fn read_batch(
        &mut self,
        candidates: &[Candidate],
        shutdown: &ShutdownToken,
    ) -> (Vec<FileRecord>, Vec<String>) {
        let mut batch = Vec::new();
        let mut texts = Vec::new();
        let mut seen_hashes = HashSet::new();

        for (index, candidate) in candidates.iter().enumerate() {
            if shutdown.is_cancelled() {
                info!(
                    remaining = candidates.len() - index,
                    "Shutdown requested, not reading further files"
                );
                break;
            }

            let bytes = match fs::read(&candidate.path)
                .with_context(|| format!("Failed to read {}", candidate.path.display()))
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.parse_failed(&candidate.key, None, e);
                    continue;
                }
            };

            let hash = hash_bytes(&bytes);
            if seen_hashes.contains(&hash) {
                debug!(file = %candidate.key, "Same content as another file in this batch");
                self.reporter.duplicate_skipped(&candidate.key);
                continue;
            }

            match InputDocument::parse(&bytes) {
                Ok(document) => {
                    self.failures.record_success(&candidate.key);
                    let file_texts = document.texts();
                    debug!(file = %candidate.key, items = file_texts.len(), "Read input file");
                    self.reporter.file_read(&candidate.key, file_texts.len());

                    seen_hashes.insert(hash.clone());
                    batch.push(FileRecord {
                        key: candidate.key.clone(),
                        hash,
                        items: file_texts.len(),
                    });
                    texts.extend(file_texts);
                }
                Err(e) => self.parse_failed(&candidate.key, Some(&hash), e),
            }
        }

        (batch, texts)
    }

    fn parse_failed(&mut self, key: &str, hash: Option<&str>, error: anyhow::Error) {
        let attempts = self.failures.record_failure(key, hash);
        let set_aside = self.failures.is_set_aside(key, hash);
        warn!(file = %key, attempts, set_aside, error = %format!("{error:#}"), "Could not read input file");
        self.reporter.file_failed(key, &error, attempts, set_aside);
    }

    /// Save the in-memory state; failures keep it marked unsaved
    fn persist(&mut self) {
        let Some(state) = &self.state else {
            return;
        };

        match self.store.save(state) {
            Ok(()) => {
                self.unsaved = false;
                self.reporter.saved(self.store.path(), state);
            }
            Err(e) => {
                warn!(path = %self.store.path().display(), error = %format!("{e:#}"), "Could not save state, will retry next cycle");
                self.reporter.save_failed(self.store.path(), &e);
            }
        }
    }

    fn stop(&mut self) {
        self.phase = AgentPhase::Stopping;
        self.reporter.stopping();
        self.reporter.final_state(self.state.as_ref());
        self.phase = AgentPhase::Stopped;
        info!("Agent stopped");
    }
}
