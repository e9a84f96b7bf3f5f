//! Aggregation of analysis artifacts into the run report.
//!
//! Rows are rebuilt from the stored analysis artifacts every time, sorted by
//! item ordinal then timestamp. Artifacts never change once written, so a
//! report generated after more items finish only ever gains rows.

use crate::analysis::AnalysisArtifact;
use crate::error::Result;
use crate::feed::{Item, ItemId};
use crate::store::{ArtifactStore, Stage};
use crate::transcription::format_timestamp;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

pub const CSV_FILE: &str = "future_episodes.csv";
pub const MARKDOWN_FILE: &str = "future_episodes.md";

const CSV_HEADER: &str = "Episode Number,Episode Title,Timestamp,Topic Summary,Context";

/// One future-episode suggestion, tied to the item it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicMention {
    pub item_id: ItemId,
    pub ordinal: u32,
    /// Episode label, or the ordinal when the title carries none.
    pub episode_number: String,
    pub title: String,
    pub timestamp_seconds: f64,
    pub topic: String,
    pub context: String,
}

/// The report in both output formats, built from the same rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub csv: String,
    pub markdown: String,
    pub rows: usize,
}

/// Turn one item's analysis artifact into mentions, dropping malformed entries.
pub fn ingest(item: &Item, artifact: &AnalysisArtifact) -> Vec<TopicMention> {
    artifact
        .candidates
        .iter()
        .filter_map(|candidate| {
            let topic = candidate.topic.trim();
            if topic.is_empty() {
                warn!("Dropping suggestion without a topic in {}", item.id);
                return None;
            }

            let timestamp = match candidate.timestamp_seconds {
                Some(t) if t.is_finite() && t >= 0.0 => t,
                other => {
                    warn!(
                        "Dropping \"{}\" in {}: unusable timestamp {:?}",
                        topic, item.id, other
                    );
                    return None;
                }
            };

            Some(TopicMention {
                item_id: item.id.clone(),
                ordinal: item.ordinal,
                episode_number: item.display_number(),
                title: item.title.clone(),
                timestamp_seconds: timestamp,
                topic: topic.to_string(),
                context: candidate.context.trim().to_string(),
            })
        })
        .collect()
}

/// Render mentions under the default heading.
pub fn render(mentions: &[TopicMention]) -> RenderedReport {
    render_with_heading(mentions, "Future Episode Suggestions")
}

/// Sort mentions by (ordinal, timestamp) and render CSV and Markdown.
pub fn render_with_heading(mentions: &[TopicMention], heading: &str) -> RenderedReport {
    let mut rows: Vec<&TopicMention> = mentions.iter().collect();
    rows.sort_by(|a, b| {
        a.ordinal
            .cmp(&b.ordinal)
            .then(a.timestamp_seconds.total_cmp(&b.timestamp_seconds))
    });

    let mut csv = String::new();
    csv.push_str(CSV_HEADER);
    csv.push('\n');

    let mut markdown = String::new();
    let _ = writeln!(markdown, "# {}\n", heading);
    let _ = writeln!(markdown, "Total instances found: {}\n", rows.len());
    markdown.push_str("| Episode # | Episode Title | Timestamp | Topic Summary | Context |\n");
    markdown.push_str("|-----------|---------------|-----------|---------------|---------|\n");

    for m in &rows {
        let timestamp = format_timestamp(m.timestamp_seconds);

        let _ = writeln!(
            csv,
            "{},{},{},{},{}",
            csv_field(&m.episode_number),
            csv_field(&m.title),
            timestamp,
            csv_field(&m.topic),
            csv_field(&m.context)
        );

        let _ = writeln!(
            markdown,
            "| {} | {} | {} | {} | {} |",
            md_cell(&m.episode_number),
            md_cell(&m.title),
            timestamp,
            md_cell(&m.topic),
            md_cell(&m.context)
        );
    }

    RenderedReport {
        csv,
        markdown,
        rows: rows.len(),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn md_cell(value: &str) -> String {
    value
        .replace('|', "\\|")
        .replace(['\r', '\n'], " ")
}

/// Collects mentions from stored artifacts and writes the report files.
pub struct Aggregator {
    heading: String,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            heading: "Future Episode Suggestions".to_string(),
        }
    }
}

impl Aggregator {
    /// Use the podcast name in the Markdown heading when known.
    pub fn new(podcast_name: Option<&str>) -> Self {
        match podcast_name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => Self {
                heading: format!("{}: Future Episode Suggestions", name),
            },
            None => Self::default(),
        }
    }

    /// Ingest every item that has an analysis artifact.
    ///
    /// Items that have not been analyzed yet are silently absent. An artifact
    /// that cannot be read is skipped with a warning.
    #[instrument(skip_all)]
    pub fn collect(&self, store: &ArtifactStore, items: &[Item]) -> Vec<TopicMention> {
        let mut mentions = Vec::new();
        let mut analyzed = 0;

        for item in items {
            if !store.has(&item.id, Stage::Analyze) {
                continue;
            }
            match store.read_json::<AnalysisArtifact>(&item.id, Stage::Analyze) {
                Ok(artifact) => {
                    analyzed += 1;
                    let found = ingest(item, &artifact);
                    debug!("{} mention(s) from {}", found.len(), item.id);
                    mentions.extend(found);
                }
                Err(e) => warn!("Skipping unreadable analysis for {}: {}", item.id, e),
            }
        }

        info!(
            "Collected {} mention(s) from {} analyzed item(s)",
            mentions.len(),
            analyzed
        );
        mentions
    }

    pub fn render(&self, mentions: &[TopicMention]) -> RenderedReport {
        render_with_heading(mentions, &self.heading)
    }

    /// Collect, render and atomically write both report files.
    pub fn write(&self, store: &ArtifactStore, items: &[Item]) -> Result<ReportFiles> {
        let report = self.render(&self.collect(store, items));
        let csv = store.write_report(CSV_FILE, &report.csv)?;
        let markdown = store.write_report(MARKDOWN_FILE, &report.markdown)?;
        info!("Wrote report with {} row(s) to {:?}", report.rows, csv);

        Ok(ReportFiles {
            csv,
            markdown,
            rows: report.rows,
        })
    }
}

/// Where the report was written.
#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub csv: PathBuf,
    pub markdown: PathBuf,
    pub rows: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TopicCandidate;
    use tempfile::TempDir;

    fn mention(ordinal: u32, t: f64, topic: &str) -> TopicMention {
        let item = Item::new(&format!("g{}", ordinal), &format!("Episode {}", ordinal), "u", ordinal);
        TopicMention {
            item_id: item.id.clone(),
            ordinal,
            episode_number: item.display_number(),
            title: item.title,
            timestamp_seconds: t,
            topic: topic.to_string(),
            context: String::new(),
        }
    }

    fn artifact(item: &Item, candidates: Vec<TopicCandidate>) -> AnalysisArtifact {
        AnalysisArtifact {
            item_id: item.id.clone(),
            candidates,
        }
    }

    #[test]
    fn test_rows_ordered_by_ordinal_then_timestamp() {
        let mentions = vec![
            mention(3, 10.0, "c"),
            mention(1, 300.0, "a2"),
            mention(2, 5.0, "b"),
            mention(1, 60.0, "a1"),
        ];

        let report = render(&mentions);
        let topics: Vec<&str> = report
            .csv
            .lines()
            .skip(1)
            .map(|line| line.split(',').nth(3).unwrap())
            .collect();
        assert_eq!(topics, vec!["a1", "a2", "b", "c"]);
    }

    #[test]
    fn test_render_is_deterministic() {
        let mentions = vec![mention(2, 5.0, "b"), mention(1, 60.0, "a")];
        assert_eq!(render(&mentions), render(&mentions));

        let mut reversed = mentions.clone();
        reversed.reverse();
        assert_eq!(render(&mentions).csv, render(&reversed).csv);
    }

    #[test]
    fn test_csv_and_markdown_escaping() {
        let mut m = mention(1, 3725.0, "Replication, \"crisis\"");
        m.context = "a | b\nc".to_string();

        let report = render(&[m]);
        assert_eq!(
            report.csv,
            "Episode Number,Episode Title,Timestamp,Topic Summary,Context\n\
             1,Episode 1,01:02:05,\"Replication, \"\"crisis\"\"\",\"a | b\nc\"\n"
        );
        assert!(report
            .markdown
            .contains("| 1 | Episode 1 | 01:02:05 | Replication, \"crisis\" | a \\| b c |"));
        assert!(report.markdown.contains("Total instances found: 1"));
    }

    #[test]
    fn test_ingest_drops_malformed_entries() {
        let item = Item::new("g1", "Episode 25: Placebos", "u", 4);
        let candidates = vec![
            TopicCandidate::new(120.0, "fMRI"),
            TopicCandidate::new(-1.0, "Negative"),
            TopicCandidate::new(f64::NAN, "Not a number"),
            TopicCandidate::new(50.0, "   "),
            TopicCandidate {
                timestamp_seconds: None,
                topic: "Missing".to_string(),
                quote: None,
                context: String::new(),
            },
        ];

        let mentions = ingest(&item, &artifact(&item, candidates));
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].topic, "fMRI");
        assert_eq!(mentions[0].episode_number, "25");
        assert_eq!(mentions[0].ordinal, 4);
    }

    #[test]
    fn test_collect_and_write_additively() {
        let temp = TempDir::new().unwrap();
        let store = ArtifactStore::under(temp.path());
        let a = Item::new("ga", "Episode 1", "u", 1);
        let b = Item::new("gb", "Episode 2", "u", 2);
        let items = vec![a.clone(), b.clone()];
        let aggregator = Aggregator::new(Some("Science Fictions"));

        store
            .write_json(&b.id, Stage::Analyze, &artifact(&b, vec![TopicCandidate::new(30.0, "Later")]))
            .unwrap();
        let first = aggregator.write(&store, &items).unwrap();
        assert_eq!(first.rows, 1);
        let first_csv = std::fs::read_to_string(&first.csv).unwrap();

        store
            .write_json(&a.id, Stage::Analyze, &artifact(&a, vec![TopicCandidate::new(90.0, "Earlier")]))
            .unwrap();
        let second = aggregator.write(&store, &items).unwrap();
        assert_eq!(second.rows, 2);

        let second_csv = std::fs::read_to_string(&second.csv).unwrap();
        let first_row = first_csv.lines().nth(1).unwrap();
        assert_eq!(second_csv.lines().nth(2), Some(first_row));

        let markdown = std::fs::read_to_string(&second.markdown).unwrap();
        assert!(markdown.starts_with("# Science Fictions: Future Episode Suggestions"));
    }
}
