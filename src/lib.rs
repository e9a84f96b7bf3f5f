//! Podsift - resumable podcast mining
//!
//! A CLI tool that walks a podcast feed, downloads and transcribes every
//! episode, asks a language model for "we should do an episode on..."
//! moments, and aggregates them into a CSV and Markdown report.
//!
//! # Architecture
//!
//! - `store` - Durable per-item artifacts; presence is the record of completion
//! - `ledger` - SQLite cache of per-item, per-stage status
//! - `pipeline` - Stage runner with store gating and bounded retry
//! - `orchestrator` - Batch coordination and run summary
//! - `report` - Aggregation of analysis artifacts into the report
//! - `feed` - RSS/Atom feed source
//! - `audio` - Media download and ffmpeg segmentation
//! - `transcription` - Speech-to-text with word-level timing
//! - `analysis` - Topic extraction
//! - `config` - Configuration management
//!
//! # Example
//!
//! ```rust,no_run
//! use podsift::config::Settings;
//! use podsift::feed::{FeedSource, RssFeed};
//! use podsift::orchestrator::Orchestrator;
//! use podsift::report::Aggregator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let items = RssFeed::new(&settings.feed_url()?)?.fetch_items().await?;
//!
//!     let orchestrator = Orchestrator::new(&settings)?;
//!     let summary = orchestrator.process(&items).await?;
//!     let report = Aggregator::default().write(orchestrator.store(), &items)?;
//!
//!     println!("{} failed, {} suggestions", summary.failed, report.rows);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod ledger;
pub mod openai;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod transcription;

pub use error::{ErrorKind, PodsiftError, Result};
