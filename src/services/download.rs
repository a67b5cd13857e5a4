use crate::models::{DownloadStatus, FetchSettings};
use camino::{Utf8Path, Utf8PathBuf};
use futures_util::StreamExt;
use reqwest::{Client, StatusCode, Url};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

/// Result of a single file download.
#[derive(Debug, Clone)]
pub struct DownloadOutcome {
    pub path: Utf8PathBuf,
    pub status: DownloadStatus,
    pub bytes: u64,
    pub duration: Duration,
}

impl DownloadOutcome {
    pub fn skipped(path: &Utf8Path) -> Self {
        Self {
            path: path.to_path_buf(),
            status: DownloadStatus::Skipped,
            bytes: 0,
            duration: Duration::ZERO,
        }
    }

    pub fn summary(&self) -> String {
        match self.status {
            DownloadStatus::Skipped => format!("{} already exists", self.path),
            _ => format!(
                "{} bytes to {} in {:.1}s",
                self.bytes,
                self.path,
                self.duration.as_secs_f64()
            ),
        }
    }
}

/// Errors that can occur while downloading
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("invalid download URL '{0}'")]
    InvalidUrl(String),

    #[error("failed to download {url}: HTTP {status}")]
    HttpStatus { url: String, status: StatusCode },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    fn io(path: &Utf8Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// HTTP downloader: one GET per file, body streamed to disk.
///
/// Bodies are written to `<dest>.part` first and renamed over the destination
/// once complete, so a failed download never leaves a truncated file behind.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    overwrite_existing: bool,
}

impl Downloader {
    pub fn new(settings: &FetchSettings) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .user_agent(settings.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            overwrite_existing: settings.overwrite_existing,
        })
    }

    /// Shared with the GitHub API client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn overwrite_existing(&self) -> bool {
        self.overwrite_existing
    }

    /// Temporary file a download is streamed into before the final rename.
    pub fn part_path(dest: &Utf8Path) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.part", dest))
    }

    /// Validate that `url` is an absolute http(s) URL.
    pub fn parse_url(url: &str) -> Result<Url, DownloadError> {
        let parsed = Url::parse(url.trim()).map_err(|_| DownloadError::InvalidUrl(url.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            _ => Err(DownloadError::InvalidUrl(url.to_string())),
        }
    }

    /// Download `url` into `dest`.
    ///
    /// Skips the request when `dest` exists and overwriting is disabled.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Utf8Path,
    ) -> Result<DownloadOutcome, DownloadError> {
        self.download(url, dest, self.overwrite_existing).await
    }

    /// Download `url` into `dest`, always replacing an existing file.
    pub async fn download_file_overwriting(
        &self,
        url: &str,
        dest: &Utf8Path,
    ) -> Result<DownloadOutcome, DownloadError> {
        self.download(url, dest, true).await
    }

    async fn download(
        &self,
        url: &str,
        dest: &Utf8Path,
        overwrite: bool,
    ) -> Result<DownloadOutcome, DownloadError> {
        let parsed = Self::parse_url(url)?;

        if !overwrite && dest.exists() {
            tracing::info!("Skipping {}: {} already exists", url, dest);
            return Ok(DownloadOutcome::skipped(dest));
        }

        if let Some(parent) = dest.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let started = Instant::now();
        tracing::debug!("Downloading {} to {}", url, dest);

        let response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        let part_path = Self::part_path(dest);
        let bytes = match Self::stream_to_file(response, &part_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = fs::remove_file(&part_path).await;
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&part_path, dest).await {
            let _ = fs::remove_file(&part_path).await;
            return Err(DownloadError::io(dest, e));
        }

        let outcome = DownloadOutcome {
            path: dest.to_path_buf(),
            status: DownloadStatus::Downloaded,
            bytes,
            duration: started.elapsed(),
        };
        tracing::info!("Downloaded {} ({})", url, outcome.summary());
        Ok(outcome)
    }

    async fn stream_to_file(
        response: reqwest::Response,
        path: &Utf8Path,
    ) -> Result<u64, DownloadError> {
        let mut file = File::create(path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(path, e))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| DownloadError::io(path, e))?;
        Ok(written)
    }

    /// Fetch a small text resource with the same status rules as [`download_file`](Self::download_file).
    pub async fn fetch_text(&self, url: &str) -> Result<String, DownloadError> {
        let parsed = Self::parse_url(url)?;
        let response = self.client.get(parsed).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        Ok(response.text().await?)
    }
}
