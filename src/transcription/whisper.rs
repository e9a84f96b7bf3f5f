//! OpenAI Whisper transcription implementation.

use super::{Transcriber, Transcript, TranscriptSegment, Word};
use crate::audio::split_audio;
use crate::error::{PodsiftError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    AudioInput, AudioResponseFormat, CreateTranscriptionRequestArgs, TimestampGranularity,
};
use async_openai::Client;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// OpenAI Whisper-based transcriber.
pub struct WhisperTranscriber {
    client: Client<OpenAIConfig>,
    model: String,
    language: Option<String>,
    chunk_duration_seconds: u32,
    max_concurrent_chunks: usize,
}

impl WhisperTranscriber {
    pub fn new(
        client: Client<OpenAIConfig>,
        model: &str,
        language: Option<String>,
        chunk_duration_seconds: u32,
        max_concurrent_chunks: usize,
    ) -> Self {
        Self {
            client,
            model: model.to_string(),
            language,
            chunk_duration_seconds,
            max_concurrent_chunks: max_concurrent_chunks.max(1),
        }
    }

    /// Transcribe a single audio file (no splitting) with word-level timestamps.
    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn transcribe_single(&self, audio_path: &Path) -> Result<(Vec<Word>, Vec<TranscriptSegment>)> {
        debug!("Transcribing audio file");

        let file_bytes = tokio::fs::read(audio_path).await?;

        let mut request_builder = CreateTranscriptionRequestArgs::default();
        request_builder
            .file(AudioInput::from_vec_u8(
                audio_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("audio.mp3")
                    .to_string(),
                file_bytes,
            ))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson)
            .timestamp_granularities(vec![TimestampGranularity::Word, TimestampGranularity::Segment]);

        if let Some(lang) = &self.language {
            request_builder.language(lang);
        }

        let request = request_builder
            .build()
            .map_err(|e| PodsiftError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| PodsiftError::Transcription(format!("Whisper API error: {}", e)))?;

        let segments: Vec<TranscriptSegment> = response
            .segments
            .map(|segs| {
                segs.iter()
                    .map(|s| TranscriptSegment::new(s.start as f64, s.end as f64, s.text.trim().to_string()))
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![TranscriptSegment::new(
                    0.0,
                    response.duration as f64,
                    response.text.trim().to_string(),
                )]
            });

        let words: Vec<Word> = match response.words {
            Some(ws) => ws
                .iter()
                .map(|w| Word::new(&w.word, w.start as f64, w.end as f64))
                .collect(),
            None => {
                warn!("No word-level timestamps returned, approximating from segments");
                approximate_words(&segments)
            }
        };

        debug!("Transcribed {} words in {} segments", words.len(), segments.len());
        Ok((words, segments))
    }
}

/// Spread each segment's duration evenly over its words.
fn approximate_words(segments: &[TranscriptSegment]) -> Vec<Word> {
    segments
        .iter()
        .flat_map(|s| {
            let words: Vec<&str> = s.text.split_whitespace().collect();
            if words.is_empty() {
                return Vec::new();
            }
            let word_duration = (s.end_seconds - s.start_seconds) / words.len() as f64;
            words
                .into_iter()
                .enumerate()
                .map(|(i, word)| {
                    Word::new(
                        word,
                        s.start_seconds + i as f64 * word_duration,
                        s.start_seconds + (i + 1) as f64 * word_duration,
                    )
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn transcribe(&self, item_id: &str, audio_path: &Path) -> Result<Transcript> {
        let temp_dir = tempfile::tempdir()?;
        let chunks = split_audio(audio_path, temp_dir.path(), self.chunk_duration_seconds).await?;

        if chunks.len() == 1 {
            let (words, segments) = self.transcribe_single(audio_path).await?;
            return Ok(Transcript::new(item_id.to_string(), words, segments));
        }

        let chunk_count = chunks.len();
        info!("Processing {} audio chunks with {}", chunk_count, self.model);

        let pb = ProgressBar::new(chunk_count as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {spinner:.green} Whisper   [{bar:30.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );

        let mut results = Vec::with_capacity(chunk_count);

        let mut stream = stream::iter(chunks.into_iter().enumerate())
            .map(|(idx, (chunk_path, time_offset))| async move {
                let result = self.transcribe_single(&chunk_path).await;
                (idx, time_offset, result)
            })
            .buffer_unordered(self.max_concurrent_chunks);

        // Fail fast: one bad chunk means the transcript would have a hole.
        while let Some((idx, time_offset, result)) = stream.next().await {
            pb.inc(1);
            match result {
                Ok(parts) => results.push((idx, time_offset, parts)),
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(PodsiftError::Transcription(format!(
                        "Chunk {} at {:.0}s failed: {}",
                        idx, time_offset, e
                    )));
                }
            }
        }

        pb.finish_and_clear();
        results.sort_by_key(|(idx, _, _)| *idx);

        let mut all_words = Vec::new();
        let mut all_segments = Vec::new();
        for (_, offset, (mut words, mut segments)) in results {
            for word in &mut words {
                word.start += offset;
                word.end += offset;
            }
            for segment in &mut segments {
                segment.start_seconds += offset;
                segment.end_seconds += offset;
            }
            all_words.extend(words);
            all_segments.extend(segments);
        }

        drop(temp_dir);

        Ok(Transcript::new(item_id.to_string(), all_words, all_segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approximate_words() {
        let segments = vec![
            TranscriptSegment::new(10.0, 12.0, "one two".to_string()),
            TranscriptSegment::new(12.0, 12.0, "   ".to_string()),
        ];
        let words = approximate_words(&segments);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0], Word::new("one", 10.0, 11.0));
        assert_eq!(words[1], Word::new("two", 11.0, 12.0));
    }
}
