//! Per-item stage execution.

use super::RetryPolicy;
use crate::analysis::{enrich_candidates, AnalysisArtifact, Analyzer};
use crate::audio::Downloader;
use crate::error::{ErrorKind, PodsiftError, Result};
use crate::feed::{Item, ItemId};
use crate::ledger::{ItemLedger, StageStatus};
use crate::store::{ArtifactStore, Stage};
use crate::transcription::{Transcriber, Transcript};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// What happened to one stage of one item.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// A valid artifact already existed.
    Skipped,
    /// The collaborator ran and its artifact was stored.
    Executed,
    Failed { reason: String, kind: ErrorKind },
}

/// Result of running all stages for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub item_id: ItemId,
    /// Stages that were reached, in order. A failed stage is always last.
    pub stages: Vec<(Stage, StageOutcome)>,
}

impl ItemOutcome {
    /// The failed stage and its reason, if any.
    pub fn failure(&self) -> Option<(Stage, &str)> {
        self.stages.iter().find_map(|(stage, outcome)| match outcome {
            StageOutcome::Failed { reason, .. } => Some((*stage, reason.as_str())),
            _ => None,
        })
    }

    /// The item failed because of the environment rather than the item, so
    /// every later item would fail the same way.
    pub fn is_configuration_failure(&self) -> bool {
        self.stages.iter().any(|(_, outcome)| {
            matches!(
                outcome,
                StageOutcome::Failed {
                    kind: ErrorKind::Configuration,
                    ..
                }
            )
        })
    }

    /// Every stage was already complete before this run.
    pub fn all_skipped(&self) -> bool {
        self.stages.len() == Stage::ALL.len()
            && self
                .stages
                .iter()
                .all(|(_, outcome)| *outcome == StageOutcome::Skipped)
    }

    /// Number of stages whose collaborator actually ran.
    pub fn executed(&self) -> usize {
        self.stages
            .iter()
            .filter(|(_, outcome)| *outcome == StageOutcome::Executed)
            .count()
    }
}

/// Runs download, transcribe and analyze for one item, gated by the store.
pub struct StageRunner {
    store: ArtifactStore,
    ledger: Arc<ItemLedger>,
    downloader: Arc<dyn Downloader>,
    transcriber: Arc<dyn Transcriber>,
    analyzer: Arc<dyn Analyzer>,
    download_policy: RetryPolicy,
    analysis_policy: RetryPolicy,
    context_window_seconds: f64,
}

impl StageRunner {
    pub fn new(
        store: ArtifactStore,
        ledger: Arc<ItemLedger>,
        downloader: Arc<dyn Downloader>,
        transcriber: Arc<dyn Transcriber>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            store,
            ledger,
            downloader,
            transcriber,
            analyzer,
            download_policy: RetryPolicy::new(3, 2.0),
            analysis_policy: RetryPolicy::new(3, 1.0),
            context_window_seconds: 15.0,
        }
    }

    pub fn with_download_policy(mut self, policy: RetryPolicy) -> Self {
        self.download_policy = policy;
        self
    }

    pub fn with_analysis_policy(mut self, policy: RetryPolicy) -> Self {
        self.analysis_policy = policy;
        self
    }

    pub fn with_context_window(mut self, seconds: f64) -> Self {
        self.context_window_seconds = seconds;
        self
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<ItemLedger> {
        &self.ledger
    }

    /// Run every stage for `item` in order, stopping at the first failure.
    ///
    /// Stage failures are recorded in the ledger and returned in the outcome.
    /// Only ledger errors are returned as `Err`.
    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn run_item(&self, item: &Item) -> Result<ItemOutcome> {
        let mut stages = Vec::with_capacity(Stage::ALL.len());

        for stage in Stage::ALL {
            let outcome = self.run_stage(item, stage).await?;
            let failed = matches!(outcome, StageOutcome::Failed { .. });
            stages.push((stage, outcome));
            if failed {
                break;
            }
        }

        Ok(ItemOutcome {
            item_id: item.id.clone(),
            stages,
        })
    }

    async fn run_stage(&self, item: &Item, stage: Stage) -> Result<StageOutcome> {
        let status = self.ledger.get_status(&item.id, stage)?;

        if self.store.is_valid(&item.id, stage) {
            if status != StageStatus::Done {
                warn!(
                    "Found {} artifact for {} not recorded in ledger ({}), repairing",
                    stage, item.id, status
                );
                self.ledger
                    .mark_done(&item.id, stage, &self.store.location(&item.id, stage))?;
            }
            debug!("Skipping {} for {}, artifact present", stage, item.id);
            return Ok(StageOutcome::Skipped);
        }

        if status == StageStatus::Done {
            warn!(
                "Ledger marks {} done for {} but the artifact is missing or invalid, re-running",
                stage, item.id
            );
        }

        info!("Running {} for \"{}\"", stage, item.title);
        match self.execute(item, stage).await {
            Ok(path) => {
                self.ledger.mark_done(&item.id, stage, &path)?;
                info!("Finished {} for {}", stage, item.id);
                Ok(StageOutcome::Executed)
            }
            Err(e) => {
                error!("{} failed for {}: {}", stage, item.id, e);
                let reason = e.to_string();
                self.ledger.mark_failed(&item.id, stage, &reason)?;
                Ok(StageOutcome::Failed {
                    reason,
                    kind: e.kind(),
                })
            }
        }
    }

    async fn execute(&self, item: &Item, stage: Stage) -> Result<PathBuf> {
        match stage {
            Stage::Download => self.download(item).await,
            Stage::Transcribe => self.transcribe(item).await,
            Stage::Analyze => self.analyze(item).await,
        }
    }

    async fn download(&self, item: &Item) -> Result<PathBuf> {
        let bytes = self
            .download_policy
            .run("Download", PodsiftError::is_transient, || {
                self.downloader.fetch(&item.audio_url)
            })
            .await?;

        self.store.write(&item.id, Stage::Download, &bytes)
    }

    async fn transcribe(&self, item: &Item) -> Result<PathBuf> {
        let audio_path = self.store.location(&item.id, Stage::Download);
        let transcript = self
            .transcriber
            .transcribe(item.id.as_str(), &audio_path)
            .await?;

        info!(
            "Transcribed {} words ({:.0}s of audio)",
            transcript.words.len(),
            transcript.duration_seconds
        );
        self.store.write_json(&item.id, Stage::Transcribe, &transcript)
    }

    async fn analyze(&self, item: &Item) -> Result<PathBuf> {
        let transcript: Transcript = self.store.read_json(&item.id, Stage::Transcribe)?;

        let candidates = self
            .analysis_policy
            .run(
                "Analysis",
                |e| e.is_transient() || matches!(e, PodsiftError::MalformedResponse(_)),
                || self.analyzer.extract(item, &transcript),
            )
            .await?;

        let artifact = AnalysisArtifact {
            item_id: item.id.clone(),
            candidates: enrich_candidates(candidates, &transcript, self.context_window_seconds),
        };

        info!("Found {} topic suggestion(s)", artifact.candidates.len());
        self.store.write_json(&item.id, Stage::Analyze, &artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TopicCandidate;
    use crate::pipeline::testing::Harness;

    #[tokio::test]
    async fn test_runs_all_stages() {
        let harness = Harness::new();
        let item = Item::new("g1", "Episode 1", "https://x/1.mp3", 1);
        harness.analyzer.respond(&item.id, vec![TopicCandidate::new(120.0, "fMRI")]);

        let outcome = harness.runner().run_item(&item).await.unwrap();

        assert_eq!(outcome.executed(), 3);
        assert!(outcome.failure().is_none());
        for stage in Stage::ALL {
            assert!(harness.store.is_valid(&item.id, stage));
            assert_eq!(harness.ledger.get_status(&item.id, stage).unwrap(), StageStatus::Done);
        }

        let artifact: AnalysisArtifact = harness.store.read_json(&item.id, Stage::Analyze).unwrap();
        assert_eq!(artifact.candidates.len(), 1);
        assert!(!artifact.candidates[0].context.is_empty());
    }

    #[tokio::test]
    async fn test_second_run_skips_everything() {
        let harness = Harness::new();
        let item = Item::new("g1", "Episode 1", "https://x/1.mp3", 1);
        let runner = harness.runner();

        runner.run_item(&item).await.unwrap();
        let outcome = runner.run_item(&item).await.unwrap();

        assert!(outcome.all_skipped());
        assert_eq!(harness.downloader.calls(), 1);
        assert_eq!(harness.transcriber.calls(), 1);
        assert_eq!(harness.analyzer.calls(), 1);
    }

    #[tokio::test]
    async fn test_unrecorded_artifact_is_adopted() {
        let harness = Harness::new();
        let item = Item::new("g1", "Episode 1", "https://x/1.mp3", 1);
        harness.store.write(&item.id, Stage::Download, b"audio").unwrap();

        let outcome = harness.runner().run_item(&item).await.unwrap();

        assert_eq!(outcome.stages[0], (Stage::Download, StageOutcome::Skipped));
        assert_eq!(harness.downloader.calls(), 0);
        assert_eq!(
            harness.ledger.get_status(&item.id, Stage::Download).unwrap(),
            StageStatus::Done
        );
    }

    #[tokio::test]
    async fn test_done_without_artifact_is_rerun() {
        let harness = Harness::new();
        let item = Item::new("g1", "Episode 1", "https://x/1.mp3", 1);
        let runner = harness.runner();
        runner.run_item(&item).await.unwrap();

        std::fs::remove_file(harness.store.location(&item.id, Stage::Transcribe)).unwrap();
        let outcome = runner.run_item(&item).await.unwrap();

        assert_eq!(outcome.stages[1], (Stage::Transcribe, StageOutcome::Executed));
        assert_eq!(outcome.stages[2], (Stage::Analyze, StageOutcome::Skipped));
        assert_eq!(harness.transcriber.calls(), 2);
        assert_eq!(harness.analyzer.calls(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_transcript_is_rerun() {
        let harness = Harness::new();
        let item = Item::new("g1", "Episode 1", "https://x/1.mp3", 1);
        harness.store.write(&item.id, Stage::Download, b"audio").unwrap();
        harness.store.write(&item.id, Stage::Transcribe, b"{\"truncated").unwrap();

        let outcome = harness.runner().run_item(&item).await.unwrap();

        assert_eq!(outcome.stages[1], (Stage::Transcribe, StageOutcome::Executed));
        assert_eq!(harness.transcriber.calls(), 1);
    }

    #[tokio::test]
    async fn test_download_failure_short_circuits() {
        let harness = Harness::new();
        let item = Item::new("g1", "Episode 1", "https://x/missing.mp3", 1);
        harness.downloader.fail_url("https://x/missing.mp3");

        let outcome = harness.runner().run_item(&item).await.unwrap();

        let (stage, reason) = outcome.failure().unwrap();
        assert_eq!(stage, Stage::Download);
        assert!(reason.contains("404"));
        assert_eq!(outcome.stages.len(), 1);
        assert_eq!(harness.downloader.calls(), 3);
        assert_eq!(harness.transcriber.calls(), 0);

        let record = harness.ledger.get_record(&item.id, Stage::Download).unwrap().unwrap();
        assert_eq!(record.status, StageStatus::Failed);
        assert!(!harness.store.has(&item.id, Stage::Download));
    }

    #[tokio::test]
    async fn test_transcription_not_retried() {
        let harness = Harness::new();
        let item = Item::new("g1", "Episode 1", "https://x/1.mp3", 1);
        harness.transcriber.fail_next(1);

        let outcome = harness.runner().run_item(&item).await.unwrap();

        assert_eq!(outcome.failure().map(|(s, _)| s), Some(Stage::Transcribe));
        assert_eq!(harness.transcriber.calls(), 1);
        assert_eq!(harness.analyzer.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_tool_is_a_configuration_failure() {
        let harness = Harness::new();
        let item = Item::new("g1", "Episode 1", "https://x/1.mp3", 1);
        harness.transcriber.without_ffmpeg();

        let outcome = harness.runner().run_item(&item).await.unwrap();

        assert!(outcome.is_configuration_failure());
        assert!(matches!(
            outcome.stages[1].1,
            StageOutcome::Failed {
                kind: ErrorKind::Configuration,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_corrupt_media_is_not_a_configuration_failure() {
        let harness = Harness::new();
        let item = Item::new("g1", "Episode 1", "https://x/1.mp3", 1);
        harness.transcriber.fail_next(1);

        let outcome = harness.runner().run_item(&item).await.unwrap();

        assert!(outcome.failure().is_some());
        assert!(!outcome.is_configuration_failure());
    }

    #[tokio::test]
    async fn test_analysis_retries_transient_errors() {
        let harness = Harness::new();
        let item = Item::new("g1", "Episode 1", "https://x/1.mp3", 1);
        harness.analyzer.fail_next(2);

        let outcome = harness.runner().run_item(&item).await.unwrap();

        assert!(outcome.failure().is_none());
        assert_eq!(harness.analyzer.calls(), 3);
    }

    #[tokio::test]
    async fn test_failed_stage_retried_next_run() {
        let harness = Harness::new();
        let item = Item::new("g1", "Episode 1", "https://x/1.mp3", 1);
        harness.analyzer.fail_next(3);
        let runner = harness.runner();

        let first = runner.run_item(&item).await.unwrap();
        assert_eq!(first.failure().map(|(s, _)| s), Some(Stage::Analyze));

        let second = runner.run_item(&item).await.unwrap();
        assert!(second.failure().is_none());
        assert_eq!(second.stages[0].1, StageOutcome::Skipped);
        assert_eq!(second.stages[2].1, StageOutcome::Executed);
        assert_eq!(
            harness.ledger.get_status(&item.id, Stage::Analyze).unwrap(),
            StageStatus::Done
        );
    }
}
