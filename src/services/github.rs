use crate::services::download::{DownloadError, DownloadOutcome, Downloader};
use camino::Utf8Path;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use thiserror::Error;

pub const GITHUB_WEB_BASE: &str = "https://github.com";
pub const GITHUB_API_BASE: &str = "https://api.github.com";

/// Release metadata from the GitHub releases API
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

impl Release {
    pub fn find_asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }

    /// First asset whose name ends in `.jar`, in API order.
    pub fn first_jar(&self) -> Option<&ReleaseAsset> {
        self.assets
            .iter()
            .find(|asset| asset.name.to_ascii_lowercase().ends_with(".jar"))
    }
}

/// `owner/repo` pair parsed from a repository page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

#[derive(Error, Debug)]
pub enum GitHubError {
    #[error("GitHub API returned HTTP {status} for {url}")]
    Api { url: String, status: StatusCode },

    #[error("release '{tag}' of {owner}/{repo} has no asset named '{asset}'")]
    AssetNotFound {
        owner: String,
        repo: String,
        tag: String,
        asset: String,
    },

    #[error("latest release of {owner}/{repo} has no .jar asset")]
    NoJarAsset { owner: String, repo: String },

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("GitHub request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Client for GitHub release downloads and the releases API.
///
/// No authentication, pagination or retry. Base URLs are configurable so the
/// client can be pointed at a local server.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    downloader: Downloader,
    api_base: String,
    web_base: String,
    /// Matches repository page URLs under `web_base`
    repo_pattern: Regex,
}

impl GitHubClient {
    pub fn new(downloader: Downloader) -> Self {
        Self::with_bases(downloader, GITHUB_API_BASE, GITHUB_WEB_BASE)
    }

    pub fn with_bases(downloader: Downloader, api_base: &str, web_base: &str) -> Self {
        let web_base = web_base.trim_end_matches('/').to_string();
        let repo_pattern = Regex::new(&format!(
            r"^{}/([^/\s?#]+)/([^/\s?#]+?)(?:\.git)?/?(?:releases(?:/latest)?/?)?$",
            regex::escape(&web_base)
        ))
        .expect("Invalid repository URL regex");

        Self {
            downloader,
            api_base: api_base.trim_end_matches('/').to_string(),
            web_base,
            repo_pattern,
        }
    }

    /// `https://github.com/{owner}/{repo}/releases/download/{tag}/{asset}`
    pub fn release_asset_url(&self, owner: &str, repo: &str, tag: &str, asset: &str) -> String {
        format!(
            "{}/{}/{}/releases/download/{}/{}",
            self.web_base, owner, repo, tag, asset
        )
    }

    /// Download one asset of a tagged release, replacing `dest` if present.
    pub async fn download_release_asset(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
        asset: &str,
        dest: &Utf8Path,
    ) -> Result<DownloadOutcome, GitHubError> {
        let url = self.release_asset_url(owner, repo, tag, asset);
        let outcome = self.downloader.download_file_overwriting(&url, dest).await?;

        tracing::info!("Downloaded {} to {}", asset, dest);
        Ok(outcome)
    }

    /// Look up a release by tag, or the latest release when `tag` is None.
    pub async fn fetch_release(
        &self,
        owner: &str,
        repo: &str,
        tag: Option<&str>,
    ) -> Result<Release, GitHubError> {
        let url = match tag {
            Some(tag) => format!("{}/repos/{}/{}/releases/tags/{}", self.api_base, owner, repo, tag),
            None => format!("{}/repos/{}/{}/releases/latest", self.api_base, owner, repo),
        };

        tracing::debug!("Fetching release info from {}", url);

        let response = self
            .downloader
            .client()
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GitHubError::Api { url, status });
        }

        let release: Release = response.json().await?;
        tracing::debug!(
            "Release {} of {}/{} has {} assets",
            release.tag_name,
            owner,
            repo,
            release.assets.len()
        );
        Ok(release)
    }

    /// Recognise a repository page URL (`{web}/{owner}/{repo}`, optionally
    /// followed by `/releases` or `/releases/latest`).
    pub fn parse_repo_url(&self, url: &str) -> Option<RepoRef> {
        let caps = self.repo_pattern.captures(url.trim())?;
        Some(RepoRef {
            owner: caps[1].to_string(),
            repo: caps[2].to_string(),
        })
    }

    /// Turn a mod URL into something directly downloadable.
    ///
    /// Repository page URLs resolve to the first `.jar` asset of the latest
    /// release; everything else is returned unchanged.
    pub async fn resolve_download_url(&self, url: &str) -> Result<String, GitHubError> {
        let Some(RepoRef { owner, repo }) = self.parse_repo_url(url) else {
            return Ok(url.trim().to_string());
        };

        let release = self.fetch_release(&owner, &repo, None).await?;
        let jar = release
            .first_jar()
            .ok_or_else(|| GitHubError::NoJarAsset {
                owner: owner.clone(),
                repo: repo.clone(),
            })?;

        tracing::info!(
            "Resolved {} to {} (release {})",
            url,
            jar.browser_download_url,
            release.tag_name
        );
        Ok(jar.browser_download_url.clone())
    }
}
