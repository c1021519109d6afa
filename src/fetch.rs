use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::config::Settings;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} for {url}")]
    Status { url: String, status: StatusCode },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP access to the origin and asset hosts. One per map worker.
#[derive(Clone)]
pub struct Fetcher {
    http: reqwest::Client,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        // Bounds connecting and each read, not the whole transfer: a video that
        // keeps streaming may take longer than the timeout.
        let timeout = Duration::from_secs(settings.http_timeout_secs);
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Fetcher { http })
    }

    /// GET a page and return its body as text. Non-2xx is an error.
    pub async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.get(url).await?;
        Ok(resp.text().await?)
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    pub async fn download_file(&self, url: &str, dest: &Path) -> Result<u64, FetchError> {
        let mut resp = self.get(url).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        debug!("Downloaded {} ({} bytes) to {}", url, written, dest.display());
        Ok(written)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(resp)
    }
}

// ── Tests ──
