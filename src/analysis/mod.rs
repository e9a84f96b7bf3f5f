//! Semantic extraction of future-episode suggestions.
//!
//! An [`Analyzer`] turns a transcript into topic candidates; this module then
//! pins each candidate to the word-level timing and attaches a bounded
//! context excerpt before the result is stored as the item's analysis
//! artifact.

mod openai;

pub use openai::OpenAiAnalyzer;

use crate::error::{PodsiftError, Result};
use crate::feed::{Item, ItemId};
use crate::transcription::Transcript;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One suggestion as reported by the extraction service.
///
/// Fields are lenient on purpose: validation happens when the report is
/// aggregated, so a half-formed candidate is kept in the artifact rather than
/// silently lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCandidate {
    #[serde(default)]
    pub timestamp_seconds: Option<f64>,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub quote: Option<String>,
    /// Transcript excerpt around the timestamp.
    #[serde(default)]
    pub context: String,
}

impl TopicCandidate {
    pub fn new(timestamp_seconds: f64, topic: &str) -> Self {
        Self {
            timestamp_seconds: Some(timestamp_seconds),
            topic: topic.to_string(),
            quote: None,
            context: String::new(),
        }
    }
}

/// Durable output of the analyze stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisArtifact {
    pub item_id: ItemId,
    pub candidates: Vec<TopicCandidate>,
}

/// Trait for semantic-extraction services.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Find topic suggestions in an item's transcript.
    async fn extract(&self, item: &Item, transcript: &Transcript) -> Result<Vec<TopicCandidate>>;
}

/// Resolve timestamps against word timing and attach context excerpts.
pub fn enrich_candidates(
    candidates: Vec<TopicCandidate>,
    transcript: &Transcript,
    context_window_seconds: f64,
) -> Vec<TopicCandidate> {
    candidates
        .into_iter()
        .map(|mut candidate| {
            if let Some(found) = candidate
                .quote
                .as_deref()
                .and_then(|q| transcript.find_quote(q))
            {
                candidate.timestamp_seconds = Some(found);
            }

            if let Some(t) = candidate.timestamp_seconds.filter(|t| t.is_finite() && *t >= 0.0) {
                candidate.context = transcript.text_between(
                    (t - context_window_seconds).max(0.0),
                    t + context_window_seconds,
                );
            }

            candidate
        })
        .collect()
}

/// Parse the extraction service's reply into candidates.
///
/// The reply may wrap the JSON array in prose or a markdown fence. Anything
/// that does not contain a JSON array is a malformed response.
pub fn parse_candidates(response: &str) -> Result<Vec<TopicCandidate>> {
    let json_start = response.find('[');
    let json_end = response.rfind(']');

    let json_str = match (json_start, json_end) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => {
            return Err(PodsiftError::MalformedResponse(format!(
                "No JSON array in response: {}",
                response.chars().take(200).collect::<String>()
            )))
        }
    };

    let values: Vec<Value> = serde_json::from_str(json_str)
        .map_err(|e| PodsiftError::MalformedResponse(e.to_string()))?;

    let mut candidates = Vec::with_capacity(values.len());
    for value in values {
        let Some(obj) = value.as_object() else {
            warn!("Ignoring non-object analysis entry: {}", value);
            continue;
        };

        let timestamp_seconds = obj
            .get("timestamp_seconds")
            .or_else(|| obj.get("timestamp"))
            .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(parse_clock)));

        candidates.push(TopicCandidate {
            timestamp_seconds,
            topic: obj
                .get("topic")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string(),
            quote: obj
                .get("quote")
                .and_then(Value::as_str)
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            context: String::new(),
        });
    }

    Ok(candidates)
}

/// Parse "SS", "MM:SS" or "HH:MM:SS" into seconds.
fn parse_clock(s: &str) -> Option<f64> {
    s.trim()
        .split(':')
        .try_fold(0.0f64, |acc, part| part.trim().parse::<f64>().ok().map(|v| acc * 60.0 + v))
}
