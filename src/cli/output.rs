//! CLI output formatting utilities.

use crate::orchestrator::BatchSummary;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print the end-of-run summary.
    pub fn batch_summary(summary: &BatchSummary) {
        Output::header("Run summary");
        Output::kv("Episodes", &summary.total.to_string());
        Output::kv("Processed", &summary.succeeded.to_string());
        Output::kv("Already complete", &summary.skipped.to_string());
        Output::kv("Failed", &summary.failed.to_string());
        if let Some(reason) = &summary.aborted {
            Output::kv("Stopped", &content_preview(reason, 160));
        }

        if !summary.failures.is_empty() {
            println!();
            for failure in &summary.failures {
                let stage = failure
                    .stage
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "ledger".to_string());
                println!(
                    "  {} {} ({}) - {}",
                    style("✗").red(),
                    style(&failure.title).bold(),
                    style(stage).dim(),
                    content_preview(&failure.reason, 160)
                );
            }
        }
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Truncate content with ellipsis.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        format!("{}...", content.chars().take(max_chars).collect::<String>())
    }
}
