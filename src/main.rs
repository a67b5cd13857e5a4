//! modfetch - downloads the mods of a modpack into a local folder
//!
//! Main entry point for the GUI application.
//!
//! # Execution Flow
//!
//! 1. Read `modfetch.yaml` settings from the config directory
//!    (`MODFETCH_CONFIG_DIR` or the current directory)
//! 2. Initialize logging → logs/modfetch.<date>
//! 3. Create tokio runtime with 4 worker threads
//! 4. Ask for `app.conf` if it doesn't exist yet
//! 5. Ask for `modpack.conf` if the modpack is local and doesn't exist yet
//! 6. Open the progress window, which starts the sync immediately
//! 7. Shutdown tokio runtime with 5s timeout
//!
//! Closing either configuration form without saving exits the program.
//!
//! The application uses a hybrid threading model:
//! - **Main thread**: Runs the Slint event loop (blocking, synchronous)
//! - **Tokio workers**: HTTP requests and file I/O
//! - **State listener**: Background std::thread for reactive UI updates

use anyhow::{Context, Result};
use modfetch::logging::{LOG_DIR, LOG_PREFIX};
use modfetch::models::ModpackSource;
use modfetch::ui::{GuiController, run_app_config_form, run_modpack_config_form};
use modfetch::{APP_NAME, ConfigManager, ModpackService, StateManager, UserConfig, VERSION};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let config_manager = ConfigManager::new(ConfigManager::default_dir())?;

    // Settings decide the log level, so they are read before logging exists
    let (user_config, settings_error) = match config_manager.load_user_config() {
        Ok(config) => (config, None),
        Err(e) => (UserConfig::default(), Some(e)),
    };
    let settings = user_config.fetch_settings;

    let _log_guard =
        modfetch::logging::setup_logging_with_console(LOG_DIR, LOG_PREFIX, settings.debug_mode, true)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);
    tracing::info!("Configuration directory: {}", config_manager.config_dir());
    if let Some(e) = settings_error {
        tracing::warn!("Using default settings: {:#}", e);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("modfetch-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    tracing::info!("Tokio runtime initialized with {} worker threads", 4);

    let state_manager = Arc::new(StateManager::new());
    state_manager.load_settings(&settings);

    // A missing app.conf asks the user; an unreadable one is reported in the progress window
    let app_config = if config_manager.app_config_exists() {
        config_manager.load_app_config()
    } else {
        tracing::info!("No application configuration found, asking for one");
        match run_app_config_form(&config_manager)? {
            Some(config) => Ok(config),
            None => {
                tracing::info!("Exiting without configuration");
                return Ok(());
            }
        }
    };

    if let Ok(config) = &app_config {
        state_manager.set_app_config(config);

        let needs_modpack_form = config.modpack_source() == ModpackSource::Local
            && !config_manager.modpack_config_exists();
        if needs_modpack_form {
            tracing::info!("No modpack configuration found, asking for one");
            if run_modpack_config_form(&config_manager)?.is_none() {
                tracing::info!("Exiting without modpack configuration");
                return Ok(());
            }
            state_manager.set_modpack_configured(true);
        }
    }

    let service = ModpackService::new(config_manager.clone(), &settings, state_manager.clone())
        .context("Failed to create HTTP client")?;

    let gui_controller =
        GuiController::new(state_manager.clone(), service, app_config, runtime.handle().clone())?;

    tracing::info!("GUI controller initialized, launching window");

    // Blocks until the window is closed. A running sync is cancelled on the way out.
    let result = gui_controller.run();

    tracing::info!("GUI closed, shutting down");

    if state_manager.read(|s| s.is_downloading) {
        // Give in-flight downloads a moment to observe the cancellation
        std::thread::sleep(Duration::from_millis(500));
    }

    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })
}
