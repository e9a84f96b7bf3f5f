//! Batch orchestrator for Podsift.
//!
//! Walks the feed's items in order through the stage runner and gathers a
//! summary. Items are independent: a failure is recorded and the batch moves
//! on. Stopping between items is always safe because the next run re-walks
//! the same enumeration and skips whatever is already stored.

use crate::analysis::OpenAiAnalyzer;
use crate::audio::HttpDownloader;
use crate::config::{Prompts, Settings};
use crate::error::Result;
use crate::feed::{Item, ItemId};
use crate::ledger::ItemLedger;
use crate::openai::create_client;
use crate::pipeline::{ItemOutcome, RetryPolicy, StageOutcome, StageRunner};
use crate::report::Aggregator;
use crate::store::{ArtifactStore, Stage};
use crate::transcription::WhisperTranscriber;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// One item that did not make it through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub item_id: ItemId,
    pub title: String,
    /// Stage that failed; `None` when the ledger itself could not be updated.
    pub stage: Option<Stage>,
    pub reason: String,
}

/// Counts for one batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    /// At least one stage ran and every stage is now complete.
    pub succeeded: usize,
    /// Every stage was already complete.
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<ItemFailure>,
    /// Set when an environment problem stopped the batch before the end.
    pub aborted: Option<String>,
}

/// The main orchestrator for a Podsift batch.
pub struct Orchestrator {
    runner: StageRunner,
    limit: Option<usize>,
    report: Option<Aggregator>,
}

impl Orchestrator {
    /// Build the production pipeline from settings.
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut variables = settings.prompts.variables.clone();
        if let Some(name) = &settings.feed.podcast_name {
            variables
                .entry("podcast".to_string())
                .or_insert_with(|| name.clone());
        }
        let prompts = Prompts::load(settings.prompts.custom_dir.as_deref(), Some(&variables))?;

        let api_key = settings.api_key().unwrap_or_default();
        let client = create_client(&api_key, settings.openai_timeout())?;

        let transcriber = Arc::new(WhisperTranscriber::new(
            client.clone(),
            &settings.transcription.model,
            settings.transcription.language.clone(),
            settings.transcription.chunk_duration_seconds,
            settings.transcription.max_concurrent_chunks,
        ));
        let analyzer = Arc::new(OpenAiAnalyzer::new(client, &settings.analysis.model, prompts));
        let downloader = Arc::new(HttpDownloader::new(Duration::from_secs(
            settings.download.timeout_seconds,
        ))?);

        let store = ArtifactStore::new(
            settings.downloads_dir(),
            settings.transcripts_dir(),
            settings.results_dir(),
        );
        let ledger = Arc::new(ItemLedger::open(&settings.ledger_path())?);

        info!(
            "Using {} for transcription and {} for analysis",
            settings.transcription.model, settings.analysis.model
        );

        let runner = StageRunner::new(store, ledger, downloader, transcriber, analyzer)
            .with_download_policy(RetryPolicy::new(
                settings.download.max_attempts,
                settings.download.initial_backoff_seconds,
            ))
            .with_analysis_policy(RetryPolicy::new(
                settings.analysis.max_attempts,
                settings.analysis.initial_backoff_seconds,
            ))
            .with_context_window(settings.analysis.context_window_seconds);

        let report = Aggregator::new(settings.feed.podcast_name.as_deref());
        Ok(Self::with_runner(runner, settings.run.limit).with_report(report))
    }

    /// Create an orchestrator around a prepared runner.
    pub fn with_runner(runner: StageRunner, limit: Option<usize>) -> Self {
        Self {
            runner,
            limit,
            report: None,
        }
    }

    /// Rewrite the report after every newly analyzed item.
    pub fn with_report(mut self, aggregator: Aggregator) -> Self {
        self.report = Some(aggregator);
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        self.runner.store()
    }

    pub fn ledger(&self) -> &Arc<ItemLedger> {
        self.runner.ledger()
    }

    /// Process items in feed order, honoring the configured limit.
    ///
    /// Only a failure to record the item set is returned as an error; every
    /// per-item problem ends up in the summary.
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn process(&self, items: &[Item]) -> Result<BatchSummary> {
        let selected = match self.limit {
            Some(limit) if limit < items.len() => {
                info!("Limiting run to the first {} of {} items", limit, items.len());
                &items[..limit]
            }
            _ => items,
        };

        self.ledger().record_items(items)?;

        let mut summary = BatchSummary {
            total: selected.len(),
            ..Default::default()
        };

        for (idx, item) in selected.iter().enumerate() {
            info!("[{}/{}] {}", idx + 1, selected.len(), item.title);

            let failure = match self.runner.run_item(item).await {
                Ok(outcome) => {
                    log_outcome(item, &outcome);
                    if analyzed(&outcome) {
                        self.refresh_report(items);
                    }
                    match outcome.failure() {
                        Some((stage, reason)) => {
                            if outcome.is_configuration_failure() {
                                summary.aborted = Some(reason.to_string());
                            }
                            Some((Some(stage), reason.to_string()))
                        }
                        None if outcome.all_skipped() => {
                            summary.skipped += 1;
                            None
                        }
                        None => {
                            summary.succeeded += 1;
                            None
                        }
                    }
                }
                Err(e) => {
                    error!("Could not process {}: {}", item.id, e);
                    Some((None, e.to_string()))
                }
            };

            if let Some((stage, reason)) = failure {
                summary.failed += 1;
                summary.failures.push(ItemFailure {
                    item_id: item.id.clone(),
                    title: item.title.clone(),
                    stage,
                    reason,
                });
            }

            if let Some(reason) = &summary.aborted {
                error!(
                    "Stopping after {} of {} items: {}",
                    idx + 1,
                    selected.len(),
                    reason
                );
                break;
            }
        }

        info!(
            "Batch finished: {} succeeded, {} skipped, {} failed",
            summary.succeeded, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    fn refresh_report(&self, items: &[Item]) {
        if let Some(aggregator) = &self.report {
            if let Err(e) = aggregator.write(self.store(), items) {
                warn!("Could not refresh report: {}", e);
            }
        }
    }
}

fn analyzed(outcome: &ItemOutcome) -> bool {
    outcome
        .stages
        .iter()
        .any(|(stage, result)| *stage == Stage::Analyze && *result == StageOutcome::Executed)
}

fn log_outcome(item: &Item, outcome: &ItemOutcome) {
    match outcome.failure() {
        Some((stage, _)) => info!("{} failed at {}", item.id, stage),
        None if outcome.all_skipped() => info!("{} already complete", item.id),
        None => info!("{} processed ({} stage(s) run)", item.id, outcome.executed()),
    }
}
