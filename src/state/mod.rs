// State management module
//
// Wraps AppState in Arc<RwLock<T>> and broadcasts change events so the
// progress window can follow a sync without polling.

use crate::models::{AppConfig, AppState, DownloadStatus, FetchSettings};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change events emitted when state is modified.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// App or modpack configuration status changed
    ConfigurationChanged { is_fully_configured: bool },

    /// Progress moved or the current mod changed
    ProgressUpdated {
        current: usize,
        total: usize,
        current_mod: Option<String>,
    },

    /// A sync has started
    DownloadStarted { total_mods: usize },

    /// A sync has finished (completed or cancelled)
    DownloadFinished {
        downloaded: usize,
        failed: usize,
        skipped: usize,
    },

    /// A mod has been processed
    ModProcessed {
        mod_name: String,
        status: DownloadStatus,
        message: String,
    },

    /// Current operation text changed
    OperationChanged { operation: String },

    /// Downloader settings changed
    SettingsChanged,

    /// Download state has been reset
    StateReset,
}

/// Thread-safe state manager with event emission.
///
/// - [`read()`](Self::read) and [`snapshot()`](Self::snapshot) for reading
/// - [`update()`](Self::update) for mutations; emits the detected [`StateChange`]s
/// - [`subscribe()`](Self::subscribe) to listen for changes
///
/// Clones share the same state and channel.
pub struct StateManager {
    state: Arc<RwLock<AppState>>,
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state and a 256-event buffer.
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(256);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, AppState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> AppState {
        self.read_guard().clone()
    }

    /// Run `f` with read access to the state.
    ///
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_downloading);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        f(&self.read_guard())
    }

    /// Apply `update_fn`, detect what changed and emit the events.
    ///
    /// Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        let mut state = self.write_guard();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        for change in &changes {
            // No subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn emit(&self, change: StateChange) -> StateChange {
        let _ = self.state_tx.send(change.clone());
        change
    }

    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.is_app_configured != new.is_app_configured
            || old.is_modpack_configured != new.is_modpack_configured
        {
            changes.push(StateChange::ConfigurationChanged {
                is_fully_configured: new.is_fully_configured(),
            });
        }

        if old.is_downloading != new.is_downloading {
            if new.is_downloading {
                changes.push(StateChange::DownloadStarted {
                    total_mods: new.total_mods,
                });
            } else {
                changes.push(StateChange::DownloadFinished {
                    downloaded: new.downloaded_mods.len(),
                    failed: new.failed_mods.len(),
                    skipped: new.skipped_mods.len(),
                });
            }
        }

        if old.progress != new.progress
            || old.total_mods != new.total_mods
            || old.current_mod != new.current_mod
        {
            changes.push(StateChange::ProgressUpdated {
                current: new.progress,
                total: new.total_mods,
                current_mod: new.current_mod.clone(),
            });
        }

        if old.current_operation != new.current_operation {
            changes.push(StateChange::OperationChanged {
                operation: new.current_operation.clone(),
            });
        }

        if old.request_timeout != new.request_timeout
            || old.max_concurrent_downloads != new.max_concurrent_downloads
            || old.overwrite_existing != new.overwrite_existing
        {
            changes.push(StateChange::SettingsChanged);
        }

        changes
    }

    // Convenience methods for common state updates

    pub fn set_app_config(&self, config: &AppConfig) -> Vec<StateChange> {
        self.update(|state| state.apply_app_config(config))
    }

    pub fn set_modpack_configured(&self, configured: bool) -> Vec<StateChange> {
        self.update(|state| state.is_modpack_configured = configured)
    }

    pub fn load_settings(&self, settings: &FetchSettings) -> Vec<StateChange> {
        self.update(|state| {
            state.apply_settings(settings);

            tracing::info!(
                "Loaded settings: timeout={}s, max_concurrent={}, overwrite={}",
                state.request_timeout.as_secs(),
                state.max_concurrent_downloads,
                state.overwrite_existing
            );
        })
    }

    /// Start a sync over the given mods.
    pub fn start_download(&self, mods: Vec<String>) -> Vec<StateChange> {
        self.update(|state| {
            state.reset_download_state();
            state.is_downloading = true;
            state.total_mods = mods.len();
            state.mods_to_download = mods;
            state.current_operation = "Downloading mods. Please wait...".to_string();
        })
    }

    /// Finish (or abandon) the current sync.
    pub fn stop_download(&self) -> Vec<StateChange> {
        self.update(|state| {
            state.is_downloading = false;
            state.current_mod = None;
            state.current_operation.clear();
        })
    }

    pub fn update_progress(&self, mod_name: String, operation: String) -> Vec<StateChange> {
        self.update(|state| {
            state.current_mod = Some(mod_name);
            state.current_operation = operation;
        })
    }

    /// Record the outcome of one mod and emit [`StateChange::ModProcessed`].
    pub fn add_mod_result(
        &self,
        mod_name: String,
        status: DownloadStatus,
        message: String,
        bytes: u64,
    ) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            if status == DownloadStatus::Failed {
                state
                    .failure_messages
                    .insert(mod_name.clone(), message.clone());
            }
            state.add_result(mod_name.clone(), status, bytes);
        });

        changes.push(self.emit(StateChange::ModProcessed {
            mod_name,
            status,
            message,
        }));

        changes
    }

    pub fn reset_download_state(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.reset_download_state());
        changes.push(self.emit(StateChange::StateReset));
        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
