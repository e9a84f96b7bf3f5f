//! CLI module for Podsift.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Podsift - find future-episode suggestions in a podcast back catalogue
///
/// Downloads every episode of a feed, transcribes it, asks a language model
/// for "we should do an episode on..." moments, and writes a CSV and Markdown
/// report. Interrupted runs pick up where they left off.
#[derive(Parser, Debug)]
#[command(name = "podsift")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default config file and check system requirements
    Init,

    /// Process the feed and regenerate the report
    Run {
        /// Only process the first N episodes (trial run)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Feed URL (overrides the config file)
        #[arg(short, long, env = "PODSIFT_FEED_URL")]
        feed: Option<String>,
    },

    /// Regenerate the report from stored analyses without touching the network
    Report,

    /// Show per-stage progress and failed episodes
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
