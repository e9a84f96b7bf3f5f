//! Report command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::ledger::ItemLedger;
use crate::report::Aggregator;
use crate::store::ArtifactStore;
use anyhow::Result;

/// Rebuild the report from stored analyses and the episodes in the ledger.
pub fn run_report(settings: &Settings) -> Result<()> {
    preflight::check(Operation::Report, settings)?;

    let ledger_path = settings.ledger_path();
    if !ledger_path.exists() {
        Output::warning("Nothing has been processed yet. Run 'podsift run' first.");
        return Ok(());
    }

    let ledger = ItemLedger::open(&ledger_path)?;
    let items = ledger.items()?;
    let store = ArtifactStore::new(
        settings.downloads_dir(),
        settings.transcripts_dir(),
        settings.results_dir(),
    );

    let files = Aggregator::new(settings.feed.podcast_name.as_deref()).write(&store, &items)?;

    Output::success(&format!(
        "Report has {} suggestion(s) from {} known episode(s)",
        files.rows,
        items.len()
    ));
    Output::kv("CSV", &files.csv.display().to_string());
    Output::kv("Markdown", &files.markdown.display().to_string());

    Ok(())
}
