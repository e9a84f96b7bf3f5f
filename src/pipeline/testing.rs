//! In-memory collaborators for pipeline tests.

use super::{RetryPolicy, StageRunner};
use crate::analysis::{Analyzer, TopicCandidate};
use crate::audio::Downloader;
use crate::error::{PodsiftError, Result};
use crate::feed::{Item, ItemId};
use crate::ledger::ItemLedger;
use crate::store::ArtifactStore;
use crate::transcription::{Transcriber, Transcript, TranscriptSegment, Word};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Downloader serving deterministic bytes per URL.
#[derive(Default)]
pub struct FakeDownloader {
    failing: Mutex<HashSet<String>>,
    watch: Mutex<Option<(String, PathBuf)>>,
    seen: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl FakeDownloader {
    pub fn fail_url(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    /// Capture the contents of `path` at the moment `url` is fetched.
    pub fn watch(&self, url: &str, path: &Path) {
        *self.watch.lock().unwrap() = Some((url.to_string(), path.to_path_buf()));
    }

    /// What the watched file held when the watched URL was fetched.
    pub fn seen(&self) -> Option<String> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((watched, path)) = self.watch.lock().unwrap().as_ref() {
            if watched == url {
                *self.seen.lock().unwrap() = std::fs::read_to_string(path).ok();
            }
        }
        if self.failing.lock().unwrap().contains(url) {
            return Err(PodsiftError::DownloadStatus {
                url: url.to_string(),
                status: 404,
            });
        }
        Ok(format!("audio from {}", url).into_bytes())
    }
}

/// Transcriber producing a fixed two-minute transcript.
#[derive(Default)]
pub struct FakeTranscriber {
    failures_left: AtomicUsize,
    missing_tool: AtomicBool,
    calls: AtomicUsize,
}

impl FakeTranscriber {
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Behave as if ffmpeg were not installed.
    pub fn without_ffmpeg(&self) {
        self.missing_tool.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, item_id: &str, audio_path: &Path) -> Result<Transcript> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing_tool.load(Ordering::SeqCst) {
            return Err(PodsiftError::ToolNotFound("ffmpeg".to_string()));
        }
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PodsiftError::Transcription("corrupt media".to_string()));
        }

        let audio = std::fs::read(audio_path)?;
        if audio.is_empty() {
            return Err(PodsiftError::Transcription("empty audio".to_string()));
        }

        let words = vec![
            Word::new("Welcome", 0.0, 0.6),
            Word::new("back", 0.6, 1.0),
            Word::new("we", 118.0, 118.3),
            Word::new("should", 118.3, 118.7),
            Word::new("do", 118.7, 118.9),
            Word::new("an", 118.9, 119.0),
            Word::new("episode", 119.0, 119.5),
            Word::new("on", 119.5, 119.7),
            Word::new("fMRI", 119.7, 120.4),
            Word::new("bye", 130.0, 130.5),
        ];
        let segments = vec![
            TranscriptSegment::new(0.0, 1.0, "Welcome back".to_string()),
            TranscriptSegment::new(118.0, 120.4, "we should do an episode on fMRI".to_string()),
            TranscriptSegment::new(130.0, 130.5, "bye".to_string()),
        ];
        Ok(Transcript::new(item_id.to_string(), words, segments))
    }
}

/// Analyzer returning canned candidates per item (empty by default).
#[derive(Default)]
pub struct FakeAnalyzer {
    responses: Mutex<HashMap<ItemId, Vec<TopicCandidate>>>,
    failures_left: AtomicUsize,
    missing_tool: AtomicBool,
    calls: AtomicUsize,
}

impl FakeAnalyzer {
    pub fn respond(&self, item_id: &ItemId, candidates: Vec<TopicCandidate>) {
        self.responses
            .lock()
            .unwrap()
            .insert(item_id.clone(), candidates);
    }

    /// Fail the next `n` calls with a transient service error.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn extract(&self, item: &Item, _transcript: &Transcript) -> Result<Vec<TopicCandidate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing_tool.load(Ordering::SeqCst) {
            return Err(PodsiftError::ToolNotFound("ffmpeg".to_string()));
        }
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(PodsiftError::OpenAI("503 Service Unavailable".to_string()));
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(&item.id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Temp-dir store, persistent ledger and fakes wired together.
pub struct Harness {
    pub temp: TempDir,
    pub store: ArtifactStore,
    pub ledger: Arc<ItemLedger>,
    pub downloader: Arc<FakeDownloader>,
    pub transcriber: Arc<FakeTranscriber>,
    pub analyzer: Arc<FakeAnalyzer>,
}

impl Harness {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::under(temp.path());
        let ledger = Arc::new(ItemLedger::open(&temp.path().join("results/ledger.db")).unwrap());

        Self {
            temp,
            store,
            ledger,
            downloader: Arc::new(FakeDownloader::default()),
            transcriber: Arc::new(FakeTranscriber::default()),
            analyzer: Arc::new(FakeAnalyzer::default()),
        }
    }

    /// A runner with zero-delay retries.
    pub fn runner(&self) -> StageRunner {
        StageRunner::new(
            self.store.clone(),
            self.ledger.clone(),
            self.downloader.clone(),
            self.transcriber.clone(),
            self.analyzer.clone(),
        )
        .with_download_policy(RetryPolicy::new(3, 0.0))
        .with_analysis_policy(RetryPolicy::new(3, 0.0))
    }
}
