//! Run command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::feed::{FeedSource, RssFeed};
use crate::orchestrator::Orchestrator;
use crate::report::Aggregator;
use anyhow::Result;

/// Run the batch: fetch the feed, process every episode, write the report.
pub async fn run_batch(limit: Option<usize>, feed: Option<String>, mut settings: Settings) -> Result<()> {
    if let Some(url) = feed {
        settings.feed.url = Some(url);
    }
    if limit.is_some() {
        settings.run.limit = limit;
    }

    if let Err(e) = preflight::check(Operation::Run, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'podsift init' to check your setup.");
        return Err(e.into());
    }

    let feed_url = settings.feed_url()?;
    let spinner = Output::spinner("Fetching feed...");
    let items = match RssFeed::new(&feed_url)?.fetch_items().await {
        Ok(items) => items,
        Err(e) => {
            spinner.finish_and_clear();
            Output::error(&format!("{}", e));
            return Err(e.into());
        }
    };
    spinner.finish_and_clear();

    if items.is_empty() {
        Output::warning("The feed has no episodes with audio.");
        return Ok(());
    }
    Output::info(&format!("Found {} episode(s) in the feed", items.len()));
    if let Some(limit) = settings.run.limit {
        Output::info(&format!("Processing the first {} only", limit.min(items.len())));
    }

    let orchestrator = Orchestrator::new(&settings)?;
    let summary = orchestrator.process(&items).await?;

    let aggregator = Aggregator::new(settings.feed.podcast_name.as_deref());
    let files = aggregator.write(orchestrator.store(), &items)?;

    Output::batch_summary(&summary);
    println!();
    Output::success(&format!("Report has {} suggestion(s)", files.rows));
    Output::kv("CSV", &files.csv.display().to_string());
    Output::kv("Markdown", &files.markdown.display().to_string());

    if let Some(reason) = summary.aborted {
        Output::error("The run stopped early because of a setup problem.");
        Output::info("Run 'podsift init' to check your setup.");
        anyhow::bail!(reason);
    }
    if summary.failed > 0 {
        Output::warning("Failed episodes will be retried on the next run.");
    }

    Ok(())
}
