//! Error types for Podsift.

use thiserror::Error;

/// Library-level error type for Podsift operations.
#[derive(Error, Debug)]
pub enum PodsiftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Download of {url} failed with status {status}")]
    DownloadStatus { url: String, status: u16 },

    #[error("Audio download failed: {0}")]
    AudioDownload(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),

    #[error("Artifact not found: {stage} artifact for item {item_id}")]
    ArtifactNotFound { item_id: String, stage: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// How an error should be treated by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or service hiccup; worth retrying with backoff.
    Transient,
    /// Something wrong with one item; mark it failed and move on.
    PermanentItem,
    /// The run cannot start; abort before touching any item.
    Configuration,
}

impl PodsiftError {
    /// Classify this error for retry and propagation decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PodsiftError::DownloadStatus { .. }
            | PodsiftError::AudioDownload(_)
            | PodsiftError::Http(_)
            | PodsiftError::OpenAI(_) => ErrorKind::Transient,
            PodsiftError::Config(_)
            | PodsiftError::Feed(_)
            | PodsiftError::TomlParse(_)
            | PodsiftError::ToolNotFound(_) => ErrorKind::Configuration,
            _ => ErrorKind::PermanentItem,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Result type alias for Podsift operations.
pub type Result<T> = std::result::Result<T, PodsiftError>;
