//! Audio download and processing utilities.

mod downloader;
mod splitter;

pub use downloader::{Downloader, HttpDownloader};
pub use splitter::split_audio;
