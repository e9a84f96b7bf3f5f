//! Status command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::ledger::ItemLedger;
use crate::store::Stage;
use anyhow::Result;
use console::style;

/// Show per-stage progress and every failed stage.
pub fn run_status(settings: &Settings) -> Result<()> {
    let ledger_path = settings.ledger_path();
    if !ledger_path.exists() {
        Output::info("No runs yet.");
        return Ok(());
    }

    let ledger = ItemLedger::open(&ledger_path)?;
    let items = ledger.items()?;

    Output::header("Podsift status");
    Output::kv("Ledger", &ledger_path.display().to_string());
    Output::kv("Known episodes", &items.len().to_string());
    println!();

    for stage in Stage::ALL {
        let counts = ledger.stage_counts(stage)?;
        println!(
            "  {:<11} {} done, {} failed",
            style(stage.as_str()).bold(),
            style(counts.done).green(),
            if counts.failed > 0 {
                style(counts.failed).red()
            } else {
                style(counts.failed).dim()
            }
        );
    }

    let failed = ledger.failed_records()?;
    if !failed.is_empty() {
        Output::header("Failures");
        for record in failed {
            let title = items
                .iter()
                .find(|item| item.id == record.item_id)
                .map(|item| item.title.as_str())
                .unwrap_or(record.item_id.as_str());
            Output::list_item(&format!(
                "{} [{}, {} attempt(s)]: {}",
                title,
                record.stage,
                record.attempts,
                record.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }

    Ok(())
}
