use crate::models::config::{AppConfig, FetchSettings, ModpackSource};
use camino::Utf8PathBuf;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

/// Outcome of a single mod download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadStatus {
    Downloaded,
    Failed,
    Skipped,
    Cancelled,
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DownloadStatus::Downloaded => "downloaded",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Skipped => "skipped",
            DownloadStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Single source of truth for runtime state.
///
/// Wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`]; never
/// mutate it directly, go through [`StateManager::update`](crate::state::StateManager::update)
/// so change events are emitted.
#[derive(Clone, Debug)]
pub struct AppState {
    // Configuration
    pub jar_download_path: Option<Utf8PathBuf>,
    pub modpack_source: Option<ModpackSource>,
    pub is_app_configured: bool,
    pub is_modpack_configured: bool,

    // Runtime state
    pub is_downloading: bool,
    pub current_mod: Option<String>,
    pub current_operation: String,

    // Progress state
    pub progress: usize,
    pub total_mods: usize,
    pub mods_to_download: Vec<String>,

    // Results
    pub downloaded_mods: HashSet<String>,
    pub failed_mods: HashSet<String>,
    pub skipped_mods: HashSet<String>,
    pub cancelled_mods: HashSet<String>,
    /// Error message per failed mod
    pub failure_messages: HashMap<String, String>,
    pub bytes_downloaded: u64,

    // Settings
    pub request_timeout: Duration,
    pub max_concurrent_downloads: usize,
    pub overwrite_existing: bool,
}

impl Default for AppState {
    fn default() -> Self {
        let settings = FetchSettings::default();
        Self {
            jar_download_path: None,
            modpack_source: None,
            is_app_configured: false,
            is_modpack_configured: false,

            is_downloading: false,
            current_mod: None,
            current_operation: String::new(),

            progress: 0,
            total_mods: 0,
            mods_to_download: Vec::new(),

            downloaded_mods: HashSet::new(),
            failed_mods: HashSet::new(),
            skipped_mods: HashSet::new(),
            cancelled_mods: HashSet::new(),
            failure_messages: HashMap::new(),
            bytes_downloaded: 0,

            request_timeout: settings.timeout(),
            max_concurrent_downloads: settings.concurrency(),
            overwrite_existing: settings.overwrite_existing,
        }
    }
}

impl AppState {
    pub fn is_fully_configured(&self) -> bool {
        self.is_app_configured && self.is_modpack_configured
    }

    /// Returns (downloaded, failed, skipped, total).
    pub fn download_stats(&self) -> (usize, usize, usize, usize) {
        (
            self.downloaded_mods.len(),
            self.failed_mods.len(),
            self.skipped_mods.len(),
            self.total_mods,
        )
    }

    pub fn apply_app_config(&mut self, config: &AppConfig) {
        self.jar_download_path = Some(config.jar_download_path.clone());
        self.modpack_source = Some(config.modpack_source());
        self.is_app_configured = true;
    }

    pub fn apply_settings(&mut self, settings: &FetchSettings) {
        self.request_timeout = settings.timeout();
        self.max_concurrent_downloads = settings.concurrency();
        self.overwrite_existing = settings.overwrite_existing;
    }

    /// Reset all download-related state to initial values.
    pub fn reset_download_state(&mut self) {
        self.is_downloading = false;
        self.current_mod = None;
        self.current_operation.clear();
        self.progress = 0;
        self.total_mods = 0;
        self.mods_to_download.clear();
        self.downloaded_mods.clear();
        self.failed_mods.clear();
        self.skipped_mods.clear();
        self.cancelled_mods.clear();
        self.failure_messages.clear();
        self.bytes_downloaded = 0;
    }

    /// Record the outcome for one mod and advance progress.
    pub fn add_result(&mut self, mod_name: String, status: DownloadStatus, bytes: u64) {
        match status {
            DownloadStatus::Downloaded => {
                self.downloaded_mods.insert(mod_name);
            }
            DownloadStatus::Failed => {
                self.failed_mods.insert(mod_name);
            }
            DownloadStatus::Skipped => {
                self.skipped_mods.insert(mod_name);
            }
            DownloadStatus::Cancelled => {
                self.cancelled_mods.insert(mod_name);
            }
        }
        self.bytes_downloaded += bytes;
        self.progress += 1;
    }

    /// Fraction of mods processed, in `0.0..=1.0`.
    pub fn progress_fraction(&self) -> f32 {
        if self.total_mods == 0 {
            0.0
        } else {
            (self.progress as f32 / self.total_mods as f32).min(1.0)
        }
    }
}
