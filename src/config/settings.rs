//! Configuration settings for Podsift.

use crate::error::{PodsiftError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub feed: FeedSettings,
    pub openai: OpenAiSettings,
    pub transcription: TranscriptionSettings,
    pub analysis: AnalysisSettings,
    pub download: DownloadSettings,
    pub storage: StorageSettings,
    pub run: RunSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Podcast feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct FeedSettings {
    /// RSS/Atom feed URL.
    pub url: Option<String>,
    /// Podcast name, exposed to prompts as {{podcast}}.
    pub podcast_name: Option<String>,
}

/// OpenAI credential and client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    /// API key. Falls back to the OPENAI_API_KEY environment variable.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            timeout_seconds: 300,
        }
    }
}

/// Speech-to-text settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Whisper model to use.
    pub model: String,
    /// Optional language hint (ISO-639-1).
    pub language: Option<String>,
    /// Duration in seconds for splitting long audio files.
    pub chunk_duration_seconds: u32,
    /// Maximum concurrent chunk uploads.
    pub max_concurrent_chunks: usize,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
            language: None,
            chunk_duration_seconds: 600,
            max_concurrent_chunks: 3,
        }
    }
}

/// Semantic-extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Chat model used to find topic suggestions.
    pub model: String,
    /// Attempts before an analysis is marked failed.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub initial_backoff_seconds: f64,
    /// Half-width of the transcript excerpt kept around each mention.
    pub context_window_seconds: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4.1".to_string(),
            max_attempts: 3,
            initial_backoff_seconds: 1.0,
            context_window_seconds: 15.0,
        }
    }
}

/// Media download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Attempts before a download is marked failed.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    pub initial_backoff_seconds: f64,
    /// Whole-request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_seconds: 2.0,
            timeout_seconds: 600,
        }
    }
}

/// Artifact and ledger locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub downloads_dir: String,
    pub transcripts_dir: String,
    pub results_dir: String,
    /// SQLite ledger path. Defaults to `<results_dir>/ledger.db`.
    pub ledger_path: Option<String>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            downloads_dir: "~/.podsift/downloads".to_string(),
            transcripts_dir: "~/.podsift/transcripts".to_string(),
            results_dir: "~/.podsift/results".to_string(),
            ledger_path: None,
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct RunSettings {
    /// Process only the first N feed entries (trial runs).
    pub limit: Option<usize>,
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else if path.is_some() {
            Err(PodsiftError::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )))
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| PodsiftError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("podsift")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    pub fn downloads_dir(&self) -> PathBuf {
        Self::expand_path(&self.storage.downloads_dir)
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        Self::expand_path(&self.storage.transcripts_dir)
    }

    pub fn results_dir(&self) -> PathBuf {
        Self::expand_path(&self.storage.results_dir)
    }

    /// Get the expanded ledger database path.
    pub fn ledger_path(&self) -> PathBuf {
        match &self.storage.ledger_path {
            Some(p) => Self::expand_path(p),
            None => self.results_dir().join("ledger.db"),
        }
    }

    /// Resolve the OpenAI API key from config or environment.
    pub fn api_key(&self) -> Option<String> {
        self.openai
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()))
    }

    /// Resolve the feed URL, validating it parses as http(s).
    pub fn feed_url(&self) -> Result<String> {
        let raw = self.feed.url.as_deref().ok_or_else(|| {
            PodsiftError::Config("No feed URL configured. Set [feed] url or pass --feed".to_string())
        })?;
        let parsed = url::Url::parse(raw)
            .map_err(|e| PodsiftError::Config(format!("Invalid feed URL '{}': {}", raw, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PodsiftError::Config(format!(
                "Feed URL must use http or https: {}",
                raw
            )));
        }
        Ok(parsed.to_string())
    }

    /// Check everything a run needs before any item is processed.
    pub fn validate(&self) -> Result<()> {
        self.feed_url()?;
        if self.api_key().is_none() {
            return Err(PodsiftError::Config(
                "No OpenAI API key. Set [openai] api_key or export OPENAI_API_KEY".to_string(),
            ));
        }
        if self.download.max_attempts == 0 || self.analysis.max_attempts == 0 {
            return Err(PodsiftError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn openai_timeout(&self) -> Duration {
        Duration::from_secs(self.openai.timeout_seconds)
    }
}
