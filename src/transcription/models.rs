//! Data models for transcription.

use serde::{Deserialize, Serialize};

/// A single word with precise timing from word-level timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    /// The word text.
    pub word: String,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
}

impl Word {
    pub fn new(word: &str, start: f64, end: f64) -> Self {
        Self {
            word: word.to_string(),
            start,
            end,
        }
    }
}

/// A single segment of a transcript with timestamp information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds.
    pub start_seconds: f64,
    /// End time in seconds.
    pub end_seconds: f64,
    /// Transcribed text content.
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start_seconds: f64, end_seconds: f64, text: String) -> Self {
        Self {
            start_seconds,
            end_seconds,
            text,
        }
    }
}

/// A complete transcript: ordered words with timing plus coarser segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Item this transcript belongs to.
    pub item_id: String,
    /// All words with timestamps, in order.
    pub words: Vec<Word>,
    /// Sentence-level segments with timestamps.
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,
    /// Full transcript text.
    pub full_text: String,
    /// Total duration in seconds.
    pub duration_seconds: f64,
}

impl Transcript {
    /// Create a transcript from words and segments.
    pub fn new(item_id: String, words: Vec<Word>, segments: Vec<TranscriptSegment>) -> Self {
        let full_text = if segments.is_empty() {
            join_words(words.iter())
        } else {
            segments
                .iter()
                .map(|s| s.text.trim())
                .collect::<Vec<_>>()
                .join(" ")
        };

        let duration_seconds = words
            .last()
            .map(|w| w.end)
            .into_iter()
            .chain(segments.last().map(|s| s.end_seconds))
            .fold(0.0f64, f64::max);

        Self {
            item_id,
            words,
            segments,
            full_text,
            duration_seconds,
        }
    }

    /// Text of all words overlapping `[start, end]`.
    pub fn text_between(&self, start: f64, end: f64) -> String {
        join_words(
            self.words
                .iter()
                .filter(|w| w.end >= start && w.start <= end),
        )
    }

    /// Format the transcript as timestamped lines for prompting.
    pub fn format_with_timestamps(&self) -> String {
        if self.segments.is_empty() {
            return format!("[{}] {}", format_timestamp(0.0), self.full_text);
        }

        self.segments
            .iter()
            .map(|s| format!("[{}] {}", format_timestamp(s.start_seconds), s.text.trim()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Locate a quote in the word sequence and return its start time.
    ///
    /// Matching is case- and punctuation-insensitive on the quote's leading
    /// words, retrying with fewer words if the full prefix is not found.
    pub fn find_quote(&self, quote: &str) -> Option<f64> {
        let needle: Vec<String> = quote
            .split_whitespace()
            .map(normalize)
            .filter(|w| !w.is_empty())
            .take(6)
            .collect();

        if needle.is_empty() {
            return None;
        }

        let haystack: Vec<(String, f64)> = self
            .words
            .iter()
            .map(|w| (normalize(&w.word), w.start))
            .filter(|(w, _)| !w.is_empty())
            .collect();

        let mut len = needle.len();
        while len >= needle.len().min(3) && len > 0 {
            let prefix = &needle[..len];
            if let Some(pos) = haystack
                .windows(len)
                .position(|win| win.iter().zip(prefix).all(|((w, _), n)| w == n))
            {
                return Some(haystack[pos].1);
            }
            len -= 1;
        }

        None
    }
}

fn join_words<'a>(words: impl Iterator<Item = &'a Word>) -> String {
    words
        .map(|w| w.word.trim())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize(word: &str) -> String {
    word.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds.max(0.0) as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
