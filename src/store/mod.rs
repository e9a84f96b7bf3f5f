//! Durable, per-item artifact storage.
//!
//! Every stage output lives at a location computed from the item id and the
//! stage, so presence of the file is the authoritative record that the stage
//! completed. Writes go through a temporary file in the destination directory
//! and are renamed into place, so a crash mid-write never leaves something
//! that looks like a finished artifact.

use crate::analysis::AnalysisArtifact;
use crate::error::{PodsiftError, Result};
use crate::feed::ItemId;
use crate::transcription::Transcript;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// One step of the per-item pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Download,
    Transcribe,
    Analyze,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Download, Stage::Transcribe, Stage::Analyze];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Transcribe => "transcribe",
            Stage::Analyze => "analyze",
        }
    }

    fn file_suffix(&self) -> &'static str {
        match self {
            Stage::Download => "mp3",
            Stage::Transcribe => "transcript.json",
            Stage::Analyze => "analysis.json",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "download" => Ok(Stage::Download),
            "transcribe" => Ok(Stage::Transcribe),
            "analyze" => Ok(Stage::Analyze),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// Filesystem-backed artifact store.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    downloads_dir: PathBuf,
    transcripts_dir: PathBuf,
    results_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(downloads_dir: PathBuf, transcripts_dir: PathBuf, results_dir: PathBuf) -> Self {
        Self {
            downloads_dir,
            transcripts_dir,
            results_dir,
        }
    }

    /// Lay all directories out under one root (used by tests and `init`).
    pub fn under(root: &Path) -> Self {
        Self::new(
            root.join("downloads"),
            root.join("transcripts"),
            root.join("results"),
        )
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    fn stage_dir(&self, stage: Stage) -> PathBuf {
        match stage {
            Stage::Download => self.downloads_dir.clone(),
            Stage::Transcribe => self.transcripts_dir.clone(),
            Stage::Analyze => self.results_dir.join("analysis"),
        }
    }

    /// Where the artifact for this item and stage lives, present or not.
    pub fn location(&self, item_id: &ItemId, stage: Stage) -> PathBuf {
        self.stage_dir(stage)
            .join(format!("{}.{}", item_id, stage.file_suffix()))
    }

    /// Whether a non-empty artifact exists.
    pub fn has(&self, item_id: &ItemId, stage: Stage) -> bool {
        std::fs::metadata(self.location(item_id, stage))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Whether the artifact exists and parses as its stage's structure.
    ///
    /// This is the single gate every stage uses to decide whether to skip.
    pub fn is_valid(&self, item_id: &ItemId, stage: Stage) -> bool {
        if !self.has(item_id, stage) {
            return false;
        }

        let parsed = match stage {
            Stage::Download => return true,
            Stage::Transcribe => self.read_json::<Transcript>(item_id, stage).map(|_| ()),
            Stage::Analyze => self.read_json::<AnalysisArtifact>(item_id, stage).map(|_| ()),
        };

        match parsed {
            Ok(()) => true,
            Err(e) => {
                warn!("Ignoring unreadable {} artifact for {}: {}", stage, item_id, e);
                false
            }
        }
    }

    /// Atomically write raw bytes as this item's artifact for `stage`.
    pub fn write(&self, item_id: &ItemId, stage: Stage, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.location(item_id, stage);
        write_atomic(&path, bytes)?;
        debug!("Wrote {} artifact for {} ({} bytes)", stage, item_id, bytes.len());
        Ok(path)
    }

    /// Atomically write a structured artifact as pretty JSON.
    pub fn write_json<T: Serialize>(&self, item_id: &ItemId, stage: Stage, value: &T) -> Result<PathBuf> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write(item_id, stage, &bytes)
    }

    /// Read an artifact's bytes.
    pub fn read(&self, item_id: &ItemId, stage: Stage) -> Result<Vec<u8>> {
        let path = self.location(item_id, stage);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PodsiftError::ArtifactNotFound {
                    item_id: item_id.to_string(),
                    stage: stage.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read and deserialize a structured artifact.
    pub fn read_json<T: DeserializeOwned>(&self, item_id: &ItemId, stage: Stage) -> Result<T> {
        let bytes = self.read(item_id, stage)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Atomically write a report file into the results directory.
    pub fn write_report(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.results_dir.join(name);
        write_atomic(&path, contents.as_bytes())?;
        Ok(path)
    }
}

/// Write via a sibling temp file, fsync, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| PodsiftError::InvalidInput(format!("No parent directory: {}", path.display())))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| PodsiftError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TopicCandidate;
    use tempfile::TempDir;

    fn setup_store() -> (ArtifactStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = ArtifactStore::under(temp_dir.path());
        (store, temp_dir)
    }

    #[test]
    fn test_write_then_has_and_read() {
        let (store, _temp) = setup_store();
        let id = ItemId::from_guid("ep-1");

        assert!(!store.has(&id, Stage::Download));
        let location = store.write(&id, Stage::Download, b"ID3 audio").unwrap();

        assert_eq!(location, store.location(&id, Stage::Download));
        assert!(store.has(&id, Stage::Download));
        assert_eq!(store.read(&id, Stage::Download).unwrap(), b"ID3 audio");
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (store, _temp) = setup_store();
        let id = ItemId::from_guid("missing");
        let err = store.read(&id, Stage::Transcribe).unwrap_err();
        assert!(matches!(err, PodsiftError::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_empty_file_is_not_present() {
        let (store, _temp) = setup_store();
        let id = ItemId::from_guid("ep-empty");
        let path = store.location(&id, Stage::Download);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();

        assert!(!store.has(&id, Stage::Download));
        assert!(!store.is_valid(&id, Stage::Download));
    }

    #[test]
    fn test_truncated_json_is_not_valid() {
        let (store, _temp) = setup_store();
        let id = ItemId::from_guid("ep-broken");
        let path = store.location(&id, Stage::Transcribe);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{\"item_id\": \"abc\", \"words\": [").unwrap();

        assert!(store.has(&id, Stage::Transcribe));
        assert!(!store.is_valid(&id, Stage::Transcribe));
    }

    #[test]
    fn test_json_roundtrip_is_valid() {
        let (store, _temp) = setup_store();
        let id = ItemId::from_guid("ep-json");
        let artifact = AnalysisArtifact {
            item_id: id.clone(),
            candidates: vec![TopicCandidate {
                timestamp_seconds: Some(12.0),
                topic: "Placebos".to_string(),
                quote: None,
                context: String::new(),
            }],
        };

        store.write_json(&id, Stage::Analyze, &artifact).unwrap();
        assert!(store.is_valid(&id, Stage::Analyze));

        let read: AnalysisArtifact = store.read_json(&id, Stage::Analyze).unwrap();
        assert_eq!(read.candidates.len(), 1);
        assert_eq!(read.candidates[0].topic, "Placebos");
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let (store, _temp) = setup_store();
        let id = ItemId::from_guid("ep-2");
        store.write(&id, Stage::Download, b"first").unwrap();
        store.write(&id, Stage::Download, b"second").unwrap();

        assert_eq!(store.read(&id, Stage::Download).unwrap(), b"second");
        let entries = std::fs::read_dir(store.location(&id, Stage::Download).parent().unwrap())
            .unwrap()
            .count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_locations_are_per_stage() {
        let (store, _temp) = setup_store();
        let id = ItemId::from_raw("abc");
        assert!(store.location(&id, Stage::Download).ends_with("downloads/abc.mp3"));
        assert!(store
            .location(&id, Stage::Transcribe)
            .ends_with("transcripts/abc.transcript.json"));
        assert!(store
            .location(&id, Stage::Analyze)
            .ends_with("results/analysis/abc.analysis.json"));
    }

    #[test]
    fn test_write_report() {
        let (store, _temp) = setup_store();
        let path = store.write_report("future_episodes.csv", "a,b\n").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "a,b\n");
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!("Analyze".parse::<Stage>().unwrap(), Stage::Analyze);
        assert!("upload".parse::<Stage>().is_err());
        assert_eq!(Stage::Transcribe.to_string(), "transcribe");
    }
}
