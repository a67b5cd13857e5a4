use crate::config::ConfigManager;
use crate::models::{
    AppConfig, DownloadStatus, FetchSettings, MODPACK_ASSET_NAME, ModEntry, ModpackConfig,
    ModpackSource,
};
use crate::services::download::{DownloadError, DownloadOutcome, Downloader};
use crate::services::github::{GitHubClient, GitHubError};
use crate::state::StateManager;
use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};

/// Per-mod results of one sync, in modpack order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub total: usize,
    pub downloaded: Vec<String>,
    pub skipped: Vec<String>,
    pub cancelled: Vec<String>,
    /// (mod name, error message)
    pub failed: Vec<(String, String)>,
    pub bytes: u64,
    /// Cancelled before the modpack list was fetched
    pub aborted: bool,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        self.aborted || !self.cancelled.is_empty()
    }

    pub fn summary(&self) -> String {
        if self.aborted {
            return "Cancelled before any mod was downloaded".to_string();
        }

        let mut summary = format!(
            "{} of {} mods downloaded, {} skipped, {} failed",
            self.downloaded.len(),
            self.total,
            self.skipped.len(),
            self.failed.len()
        );
        if !self.cancelled.is_empty() {
            summary.push_str(&format!(", {} cancelled", self.cancelled.len()));
        }
        summary
    }

    fn record(&mut self, name: String, status: DownloadStatus, message: String, bytes: u64) {
        self.bytes += bytes;
        match status {
            DownloadStatus::Downloaded => self.downloaded.push(name),
            DownloadStatus::Skipped => self.skipped.push(name),
            DownloadStatus::Cancelled => self.cancelled.push(name),
            DownloadStatus::Failed => self.failed.push((name, message)),
        }
    }
}

/// Fetches the modpack list and downloads every mod in it.
///
/// Framework-agnostic: progress goes through [`StateManager`] events, the
/// caller decides how to show it.
#[derive(Clone)]
pub struct ModpackService {
    config_manager: ConfigManager,
    downloader: Downloader,
    github: GitHubClient,
    state: Arc<StateManager>,
    concurrency: usize,
}

/// Resolves once `cancel_rx` reads `true`. Never resolves if the sender is gone.
async fn cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    let closed = cancel_rx.wait_for(|cancel| *cancel).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

impl ModpackService {
    pub fn new(
        config_manager: ConfigManager,
        settings: &FetchSettings,
        state: Arc<StateManager>,
    ) -> Result<Self, DownloadError> {
        let downloader = Downloader::new(settings)?;
        let github = GitHubClient::new(downloader.clone());
        Ok(Self::with_clients(
            config_manager,
            downloader,
            github,
            state,
            settings.concurrency(),
        ))
    }

    pub fn with_clients(
        config_manager: ConfigManager,
        downloader: Downloader,
        github: GitHubClient,
        state: Arc<StateManager>,
        concurrency: usize,
    ) -> Self {
        Self {
            config_manager,
            downloader,
            github,
            state,
            concurrency: concurrency.max(1),
        }
    }

    pub fn state(&self) -> &Arc<StateManager> {
        &self.state
    }

    /// Bring `modpack.conf` up to date from the configured source and load it.
    ///
    /// Remote sources always replace the local file; [`ModpackSource::Local`]
    /// requires it to exist already.
    pub async fn fetch_modpack_config(&self, app_config: &AppConfig) -> Result<ModpackConfig> {
        let dest = self.config_manager.modpack_config_path();

        match app_config.modpack_source() {
            ModpackSource::Url(url) => {
                tracing::info!("Fetching modpack configuration from {}", url);
                self.downloader
                    .download_file_overwriting(&url, dest)
                    .await
                    .with_context(|| format!("Failed to download modpack configuration from {}", url))?;
            }
            ModpackSource::GitHubRelease { owner, repo, tag } => {
                self.fetch_release_modpack(&owner, &repo, tag.as_deref(), dest)
                    .await
                    .with_context(|| {
                        format!("Failed to fetch {} from {}/{}", MODPACK_ASSET_NAME, owner, repo)
                    })?;
            }
            ModpackSource::Local => {
                if !self.config_manager.modpack_config_exists() {
                    bail!("No modpack configuration found at {}", dest);
                }
                tracing::info!("Using local modpack configuration {}", dest);
            }
        }

        self.config_manager.load_modpack_config()
    }

    async fn fetch_release_modpack(
        &self,
        owner: &str,
        repo: &str,
        tag: Option<&str>,
        dest: &Utf8Path,
    ) -> Result<DownloadOutcome, GitHubError> {
        if let Some(tag) = tag {
            return self
                .github
                .download_release_asset(owner, repo, tag, MODPACK_ASSET_NAME, dest)
                .await;
        }

        let release = self.github.fetch_release(owner, repo, None).await?;
        let asset = release
            .find_asset(MODPACK_ASSET_NAME)
            .ok_or_else(|| GitHubError::AssetNotFound {
                owner: owner.to_string(),
                repo: repo.to_string(),
                tag: release.tag_name.clone(),
                asset: MODPACK_ASSET_NAME.to_string(),
            })?;

        tracing::info!(
            "Using {} from latest release {} of {}/{}",
            MODPACK_ASSET_NAME,
            release.tag_name,
            owner,
            repo
        );
        Ok(self
            .downloader
            .download_file_overwriting(&asset.browser_download_url, dest)
            .await?)
    }

    /// Fetch the modpack list and download every mod into the jar directory.
    ///
    /// A failing mod is recorded and the rest continue. Only a failure to get
    /// the modpack list itself aborts the sync with an error. Setting
    /// `cancel_rx` to `true` stops queued and in-flight downloads.
    pub async fn sync(
        &self,
        app_config: &AppConfig,
        cancel_rx: watch::Receiver<bool>,
    ) -> Result<SyncReport> {
        tracing::info!("Starting modpack sync");

        // Results of a previous run must not leak into this one
        self.state.reset_download_state();
        self.state.update(|s| {
            s.current_operation = "Fetching modpack configuration...".to_string();
        });

        let mut cancel_for_fetch = cancel_rx.clone();
        let modpack = tokio::select! {
            biased;
            _ = cancelled(&mut cancel_for_fetch) => {
                tracing::warn!("Sync cancelled while fetching the modpack configuration");
                self.state.stop_download();
                return Ok(SyncReport {
                    aborted: true,
                    ..SyncReport::default()
                });
            }
            result = self.fetch_modpack_config(app_config) => result,
        };

        let modpack = match modpack {
            Ok(modpack) => modpack,
            Err(e) => {
                self.state.stop_download();
                return Err(e);
            }
        };
        self.state.set_modpack_configured(true);

        let mut report = SyncReport {
            total: modpack.len(),
            ..SyncReport::default()
        };

        if modpack.is_empty() {
            tracing::warn!("Modpack configuration lists no mods");
            self.state.update(|s| {
                s.current_operation = "No mods to download".to_string();
            });
            return Ok(report);
        }

        let jar_dir = app_config.jar_download_path.clone();
        tokio::fs::create_dir_all(&jar_dir)
            .await
            .with_context(|| format!("Failed to create jar directory: {}", jar_dir))?;

        self.state.start_download(modpack.names());

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        tracing::info!(
            "Downloading {} mods to {} (max concurrent: {})",
            modpack.len(),
            jar_dir,
            self.concurrency
        );

        // All tasks are spawned up front and queue on the semaphore, so a
        // cancellation reaches queued mods immediately.
        let mut tasks = Vec::with_capacity(modpack.len());
        for entry in modpack.entries().iter().cloned() {
            let service = self.clone();
            let semaphore = semaphore.clone();
            let mut cancel_rx = cancel_rx.clone();
            let jar_dir = jar_dir.clone();
            let name = entry.name.clone();

            let task = tokio::spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = cancelled(&mut cancel_rx) => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };

                let (status, message, bytes) = match permit {
                    Some(_permit) => service.process_mod(&entry, &jar_dir, cancel_rx).await,
                    None => {
                        tracing::warn!("Download cancelled before starting mod: {}", entry.name);
                        (DownloadStatus::Cancelled, "Cancelled".to_string(), 0)
                    }
                };

                service
                    .state
                    .add_mod_result(entry.name.clone(), status, message.clone(), bytes);
                (status, message, bytes)
            });

            tasks.push((name, task));
        }

        for (name, task) in tasks {
            match task.await {
                Ok((status, message, bytes)) => report.record(name, status, message, bytes),
                Err(e) => {
                    tracing::error!("Task join error for {}: {}", name, e);
                    self.state.add_mod_result(
                        name.clone(),
                        DownloadStatus::Failed,
                        e.to_string(),
                        0,
                    );
                    report.record(name, DownloadStatus::Failed, e.to_string(), 0);
                }
            }
        }

        self.state.stop_download();
        tracing::info!("Modpack sync finished: {}", report.summary());

        Ok(report)
    }

    /// Download one mod, racing it against cancellation.
    async fn process_mod(
        &self,
        entry: &ModEntry,
        jar_dir: &Utf8Path,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> (DownloadStatus, String, u64) {
        let dest = jar_dir.join(entry.file_name());
        self.state
            .update_progress(entry.name.clone(), format!("Downloading {}...", entry.name));

        tokio::select! {
            biased;
            _ = cancelled(&mut cancel_rx) => {
                tracing::warn!("Download cancelled during mod: {}", entry.name);
                // The dropped request leaves its partial body behind
                let _ = tokio::fs::remove_file(Downloader::part_path(&dest)).await;
                (DownloadStatus::Cancelled, "Cancelled".to_string(), 0)
            }
            result = self.download_mod(entry, &dest) => match result {
                Ok(outcome) => {
                    tracing::info!("Mod {} {}: {}", entry.name, outcome.status, outcome.summary());
                    (outcome.status, outcome.summary(), outcome.bytes)
                }
                Err(e) => {
                    tracing::error!("Mod {} failed: {}", entry.name, e);
                    (DownloadStatus::Failed, e.to_string(), 0)
                }
            },
        }
    }

    async fn download_mod(
        &self,
        entry: &ModEntry,
        dest: &Utf8Path,
    ) -> Result<DownloadOutcome, GitHubError> {
        // Skip before resolving so existing mods cost no API call
        if !self.downloader.overwrite_existing() && dest.exists() {
            tracing::info!("Skipping {}: {} already exists", entry.name, dest);
            return Ok(DownloadOutcome::skipped(dest));
        }

        let url = self.github.resolve_download_url(&entry.url).await?;
        tracing::info!("Downloading file from: {} to {}", url, dest);
        Ok(self.downloader.download_file(&url, dest).await?)
    }
}
