//! Configuration module for Podsift.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{AnalysisPrompts, Prompts};
pub use settings::{
    AnalysisSettings, DownloadSettings, FeedSettings, GeneralSettings, OpenAiSettings,
    PromptSettings, RunSettings, Settings, StorageSettings, TranscriptionSettings,
};
