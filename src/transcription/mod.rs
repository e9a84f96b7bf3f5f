//! Transcription module for Podsift.
//!
//! Speech-to-text with word-level timing, via the OpenAI Whisper API.

mod models;
mod whisper;

pub use models::{format_timestamp, Transcript, TranscriptSegment, Word};
pub use whisper::WhisperTranscriber;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Trait for transcription services.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the downloaded audio for an item.
    async fn transcribe(&self, item_id: &str, audio_path: &Path) -> Result<Transcript>;
}
