// GUI Controller - Bridges the progress window with the modpack sync
//
// This module contains the GuiController which coordinates between:
// - Slint UI (MainWindow)
// - StateManager (application state)
// - ModpackService (business logic)
// - EventLoopBridge (async/GUI coordination)
//
// It handles:
// - Starting the sync as soon as the window is created
// - Subscribing to state changes → UI updates
// - Cancellation and the close confirmation

use super::MainWindow;
use crate::models::{AppConfig, AppState};
use crate::services::{ModpackService, SyncReport};
use crate::state::{StateChange, StateManager};
use crate::ui::bridge::{EventLoopBridge, EventLoopBridgeHandle};
use anyhow::{Context, Result};
use slint::ComponentHandle;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

/// Controller for the progress window.
///
/// # Example
/// ```ignore
/// let service = ModpackService::new(config_manager, &settings, state_manager.clone())?;
/// let controller = GuiController::new(
///     state_manager,
///     service,
///     Ok(app_config),
///     runtime.handle().clone(),
/// )?;
/// controller.run()?;  // Blocks until window is closed
/// ```
pub struct GuiController {
    ui: MainWindow,

    /// Keeps the UI update handler thread alive
    _bridge: EventLoopBridge<MainWindow>,

    state_manager: Arc<StateManager>,

    /// Send `true` to cancel the running sync
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl GuiController {
    /// Create the progress window and start the sync.
    ///
    /// When `app_config` is an error the window opens in its error state and
    /// nothing is downloaded.
    pub fn new(
        state_manager: Arc<StateManager>,
        service: ModpackService,
        app_config: Result<AppConfig>,
        tokio_handle: tokio::runtime::Handle,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create Slint UI")?;
        let bridge = EventLoopBridge::new(&ui, tokio_handle);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);

        Self::sync_ui_with_state(&ui, &state_manager.snapshot());
        Self::setup_callbacks(&ui, &state_manager, &cancel_tx);
        Self::setup_state_subscription(&bridge, &state_manager);

        match app_config {
            Ok(app_config) => {
                Self::start_sync(bridge.clone_handle(), service, app_config, cancel_rx);
            }
            Err(e) => {
                tracing::error!("Cannot start download: {:#}", e);
                ui.set_is_finished(true);
                ui.set_error_message(format!("{:#}", e).into());
            }
        }

        tracing::info!("GUI controller initialized");

        Ok(Self {
            ui,
            _bridge: bridge,
            state_manager,
            cancel_tx,
        })
    }

    /// Run the GUI (blocks until window is closed)
    ///
    /// A sync still running when the window goes away is cancelled.
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Starting GUI event loop");
        let result = self.ui.run();

        if self.state_manager.read(|s| s.is_downloading) {
            tracing::warn!("Window closed during download - cancelling");
            self.request_cancel();
        }

        result
    }

    /// Cancel the running sync, if any.
    pub fn request_cancel(&self) {
        tracing::info!("Cancellation requested via watch channel");
        self.cancel_tx.send_replace(true);
    }

    fn sync_ui_with_state(ui: &MainWindow, state: &AppState) {
        ui.set_is_downloading(state.is_downloading);
        ui.set_progress(state.progress_fraction());
        ui.set_progress_current(state.progress as i32);
        ui.set_progress_total(state.total_mods as i32);
        ui.set_current_mod(state.current_mod.clone().unwrap_or_default().into());
        ui.set_current_operation(state.current_operation.clone().into());
        ui.set_downloaded_count(state.downloaded_mods.len() as i32);
        ui.set_skipped_count(state.skipped_mods.len() as i32);
        ui.set_failed_count(state.failed_mods.len() as i32);
    }

    fn setup_callbacks(
        ui: &MainWindow,
        state_manager: &Arc<StateManager>,
        cancel_tx: &Arc<watch::Sender<bool>>,
    ) {
        let cancel = Arc::clone(cancel_tx);
        let state = Arc::clone(state_manager);
        ui.on_cancel(move || {
            tracing::info!("Cancel button clicked - requesting cancellation");
            cancel.send_replace(true);
            state.update(|s| s.current_operation = "Cancelling...".to_string());
        });

        let ui_weak = ui.as_weak();
        ui.on_close_window(move || {
            if let Some(ui) = ui_weak.upgrade() {
                let _ = ui.hide();
            }
        });

        let cancel = Arc::clone(cancel_tx);
        let ui_weak = ui.as_weak();
        ui.on_confirm_close(move || {
            tracing::info!("Exit confirmed during download");
            cancel.send_replace(true);
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_close_confirmation(false);
                let _ = ui.hide();
            }
        });

        let state = Arc::clone(state_manager);
        let ui_weak = ui.as_weak();
        ui.window().on_close_requested(move || {
            if state.read(|s| s.is_downloading) {
                tracing::info!("Close requested during download - showing confirmation");
                if let Some(ui) = ui_weak.upgrade() {
                    ui.set_show_close_confirmation(true);
                }
                slint::CloseRequestResponse::KeepWindowShown
            } else {
                slint::CloseRequestResponse::HideWindow
            }
        });

        tracing::debug!("UI callbacks configured");
    }

    /// Forward state changes to the window from a background thread.
    fn setup_state_subscription(
        bridge: &EventLoopBridge<MainWindow>,
        state_manager: &Arc<StateManager>,
    ) {
        let bridge_handle = bridge.clone_handle();
        let state_manager_clone = Arc::clone(state_manager);
        let mut rx = state_manager.subscribe();

        std::thread::spawn(move || {
            tracing::debug!("State subscription thread started");

            loop {
                match rx.blocking_recv() {
                    Ok(change) => {
                        tracing::trace!("State change received: {:?}", change);
                        Self::apply_change(&bridge_handle, &state_manager_clone, change);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!(
                            "State broadcast channel closed - shutting down subscription thread"
                        );
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Counters are re-read from a snapshot, so resync everything
                        tracing::warn!("State subscription lagged - {} events were skipped", skipped);
                        let snapshot = state_manager_clone.snapshot();
                        bridge_handle.update_ui(move |ui| Self::sync_ui_with_state(ui, &snapshot));
                    }
                }
            }

            tracing::debug!("State subscription thread terminated");
        });
    }

    fn apply_change(
        bridge: &EventLoopBridgeHandle<MainWindow>,
        state_manager: &StateManager,
        change: StateChange,
    ) {
        match change {
            StateChange::DownloadStarted { total_mods } => {
                tracing::info!("Download started: {} mods", total_mods);
                bridge.update_ui(move |ui| {
                    ui.set_is_downloading(true);
                    ui.set_is_finished(false);
                    ui.set_progress(0.0);
                    ui.set_progress_current(0);
                    ui.set_progress_total(total_mods as i32);
                    ui.set_failures("".into());
                    ui.set_status_message("".into());
                });
            }

            StateChange::ProgressUpdated {
                current,
                total,
                current_mod,
            } => {
                let fraction = state_manager.read(|s| s.progress_fraction());
                bridge.update_ui(move |ui| {
                    ui.set_progress(fraction);
                    ui.set_progress_current(current as i32);
                    ui.set_progress_total(total as i32);
                    ui.set_current_mod(current_mod.unwrap_or_default().into());
                });
            }

            StateChange::ModProcessed {
                mod_name,
                status,
                message,
            } => {
                tracing::debug!("Mod processed: {} - {} ({})", mod_name, status, message);
                let snapshot = state_manager.snapshot();
                let failures = failure_lines(&snapshot);
                bridge.update_ui(move |ui| {
                    ui.set_downloaded_count(snapshot.downloaded_mods.len() as i32);
                    ui.set_skipped_count(snapshot.skipped_mods.len() as i32);
                    ui.set_failed_count(snapshot.failed_mods.len() as i32);
                    ui.set_failures(failures.into());
                });
            }

            StateChange::DownloadFinished {
                downloaded,
                failed,
                skipped,
            } => {
                tracing::info!(
                    "Download finished: downloaded={}, failed={}, skipped={}",
                    downloaded,
                    failed,
                    skipped
                );
                bridge.update_ui(move |ui| {
                    ui.set_is_downloading(false);
                    ui.set_current_mod("".into());
                    ui.set_downloaded_count(downloaded as i32);
                    ui.set_failed_count(failed as i32);
                    ui.set_skipped_count(skipped as i32);
                });
            }

            StateChange::OperationChanged { operation } => {
                bridge.update_ui(move |ui| {
                    ui.set_current_operation(operation.into());
                });
            }

            StateChange::StateReset => {
                let snapshot = state_manager.snapshot();
                bridge.update_ui(move |ui| {
                    Self::sync_ui_with_state(ui, &snapshot);
                    ui.set_failures("".into());
                });
            }

            StateChange::ConfigurationChanged { .. } | StateChange::SettingsChanged => {}
        }
    }

    fn start_sync(
        bridge: EventLoopBridgeHandle<MainWindow>,
        service: ModpackService,
        app_config: AppConfig,
        cancel_rx: watch::Receiver<bool>,
    ) {
        let bridge_for_task = bridge.clone();
        bridge.spawn_async(move || async move {
            match service.sync(&app_config, cancel_rx).await {
                Ok(report) => {
                    let message = completion_message(&report);
                    tracing::info!("{}", message);
                    bridge_for_task.update_ui(move |ui| {
                        ui.set_is_finished(true);
                        ui.set_status_message(message.into());
                    });
                }
                Err(e) => {
                    tracing::error!("Modpack sync failed: {:#}", e);
                    let message = format!("{:#}", e);
                    bridge_for_task.update_ui(move |ui| {
                        ui.set_is_downloading(false);
                        ui.set_is_finished(true);
                        ui.set_error_message(message.into());
                    });
                }
            }
        });
    }
}

/// Message shown when a sync ends.
pub fn completion_message(report: &SyncReport) -> String {
    if report.aborted {
        "Download cancelled.".to_string()
    } else if report.was_cancelled() {
        format!("Download cancelled: {}.", report.summary())
    } else if report.total == 0 {
        "The modpack lists no mods.".to_string()
    } else if !report.failed.is_empty() {
        format!("Mod download completed with errors: {}.", report.summary())
    } else {
        format!("Mod download completed: {}.", report.summary())
    }
}

/// One `name: reason` line per failed mod, sorted by name.
fn failure_lines(state: &AppState) -> String {
    let mut names: Vec<&String> = state.failed_mods.iter().collect();
    names.sort();
    names
        .into_iter()
        .map(|name| match state.failure_messages.get(name) {
            Some(message) => format!("{}: {}", name, message),
            None => name.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
