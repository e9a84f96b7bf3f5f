//! Episode media download.
//!
//! A single attempt per call; retrying is the stage runner's job.

use crate::error::{PodsiftError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument};

/// Fetches raw media bytes for a URL.
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP(S) downloader.
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(timeout)
            .build()
            .map_err(|e| PodsiftError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        info!("Downloading audio");

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PodsiftError::DownloadStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let expected = response.content_length();
        let bytes = response.bytes().await?;
        check_complete(bytes.len() as u64, expected)?;

        info!("Download complete: {} bytes", bytes.len());
        Ok(bytes.to_vec())
    }
}

/// Reject empty bodies and bodies shorter than the advertised Content-Length.
fn check_complete(received: u64, expected: Option<u64>) -> Result<()> {
    if received == 0 {
        return Err(PodsiftError::AudioDownload("Server returned an empty body".to_string()));
    }
    if let Some(expected) = expected {
        if received != expected {
            return Err(PodsiftError::AudioDownload(format!(
                "Download incomplete: got {} bytes, expected {}",
                received, expected
            )));
        }
    }
    Ok(())
}
