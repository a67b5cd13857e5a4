// Configuration forms shown before the first sync
//
// Each form runs its own Slint event loop and returns once its window is
// hidden. Closing a form without saving returns None so the caller can exit.

use super::{AppConfigWindow, ModpackConfigWindow};
use crate::config::ConfigManager;
use crate::models::{
    AppConfig, AppConfigError, ModpackConfig, ModpackError, RawAppConfig, extract_mod_name,
};
use crate::services::Downloader;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use slint::ComponentHandle;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

/// Input rejected by one of the forms. Shown verbatim in the window.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    #[error(transparent)]
    AppConfig(#[from] AppConfigError),

    #[error("'{0}' is not a valid http(s) URL")]
    InvalidUrl(String),

    #[error("line {line}: {source}")]
    Modpack {
        line: usize,
        #[source]
        source: ModpackError,
    },

    #[error("enter at least one mod URL")]
    NoMods,
}

/// Values typed into the application configuration window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfigForm {
    pub modpack_config_url: String,
    pub owner: String,
    pub repo: String,
    pub tag: String,
    pub jar_download_path: String,
}

impl AppConfigForm {
    fn read(ui: &AppConfigWindow) -> Self {
        Self {
            modpack_config_url: ui.get_modpack_config_url().to_string(),
            owner: ui.get_owner().to_string(),
            repo: ui.get_repo().to_string(),
            tag: ui.get_tag().to_string(),
            jar_download_path: ui.get_jar_download_path().to_string(),
        }
    }

    /// Same rules as loading `app.conf`, plus a well-formed URL when one is given.
    pub fn validate(&self) -> Result<AppConfig, FormError> {
        let raw = RawAppConfig {
            owner: Some(self.owner.clone()),
            repo: Some(self.repo.clone()),
            tag: Some(self.tag.clone()),
            modpack_config_url: Some(self.modpack_config_url.clone()),
            jar_download_path: Some(self.jar_download_path.clone()),
        };
        let config = AppConfig::try_from(raw)?;

        if let Some(url) = &config.modpack_config_url {
            Downloader::parse_url(url).map_err(|_| FormError::InvalidUrl(url.clone()))?;
        }
        Ok(config)
    }
}

/// Build a modpack from the text area, one URL per line. Blank lines are ignored.
pub fn parse_mod_urls(text: &str) -> Result<ModpackConfig, FormError> {
    let mut modpack = ModpackConfig::new();

    for (index, line) in text.lines().enumerate() {
        let url = line.trim();
        if url.is_empty() {
            continue;
        }

        Downloader::parse_url(url).map_err(|_| FormError::InvalidUrl(url.to_string()))?;
        modpack
            .push(extract_mod_name(url), url)
            .map_err(|source| FormError::Modpack {
                line: index + 1,
                source,
            })?;
    }

    if modpack.is_empty() {
        return Err(FormError::NoMods);
    }
    Ok(modpack)
}

/// Native folder picker.
fn pick_folder(title: &str) -> Option<Utf8PathBuf> {
    rfd::FileDialog::new()
        .set_title(title)
        .pick_folder()
        .and_then(|path| {
            Utf8PathBuf::try_from(path)
                .map_err(|e| {
                    tracing::error!("Failed to convert path to UTF-8: {}", e);
                    e
                })
                .ok()
        })
}

/// Ask for the application configuration and write `app.conf`.
///
/// Returns None if the window was closed without saving.
pub fn run_app_config_form(config_manager: &ConfigManager) -> Result<Option<AppConfig>> {
    let ui = AppConfigWindow::new().context("Failed to create application configuration window")?;

    let saved: Rc<RefCell<Option<AppConfig>>> = Rc::default();

    let ui_weak = ui.as_weak();
    ui.on_browse_jar_path(move || {
        let Some(ui) = ui_weak.upgrade() else {
            return;
        };
        if let Some(path) = pick_folder("Select the folder to save .jar files to") {
            tracing::info!("Jar download path selected: {}", path);
            ui.set_jar_download_path(path.as_str().into());
        }
    });

    let ui_weak = ui.as_weak();
    let saved_clone = Rc::clone(&saved);
    let manager = config_manager.clone();
    ui.on_save(move || {
        let Some(ui) = ui_weak.upgrade() else {
            return;
        };

        let config = match AppConfigForm::read(&ui).validate() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Application configuration rejected: {}", e);
                ui.set_error_message(e.to_string().into());
                return;
            }
        };

        if let Err(e) = manager.save_app_config(&config) {
            tracing::error!("Failed to save application configuration: {:#}", e);
            ui.set_error_message(format!("{:#}", e).into());
            return;
        }

        tracing::info!("Application configuration complete");
        *saved_clone.borrow_mut() = Some(config);
        if let Err(e) = ui.hide() {
            tracing::warn!("Failed to hide application configuration window: {}", e);
        }
    });

    ui.run().context("Application configuration window failed")?;

    let result = saved.borrow_mut().take();
    if result.is_none() {
        tracing::info!("Application configuration window closed without saving");
    }
    Ok(result)
}

/// Ask for the list of mods and write `modpack.conf`.
///
/// Returns None if the window was closed without saving.
pub fn run_modpack_config_form(config_manager: &ConfigManager) -> Result<Option<ModpackConfig>> {
    let ui = ModpackConfigWindow::new().context("Failed to create modpack configuration window")?;

    let saved: Rc<RefCell<Option<ModpackConfig>>> = Rc::default();

    let ui_weak = ui.as_weak();
    let saved_clone = Rc::clone(&saved);
    let manager = config_manager.clone();
    ui.on_save(move || {
        let Some(ui) = ui_weak.upgrade() else {
            return;
        };

        let modpack = match parse_mod_urls(&ui.get_mod_urls()) {
            Ok(modpack) => modpack,
            Err(e) => {
                tracing::warn!("Modpack configuration rejected: {}", e);
                ui.set_error_message(e.to_string().into());
                return;
            }
        };

        if let Err(e) = manager.save_modpack_config(&modpack) {
            tracing::error!("Failed to save modpack configuration: {:#}", e);
            ui.set_error_message(format!("{:#}", e).into());
            return;
        }

        ui.set_error_message("".into());
        ui.set_saved_summary(modpack.summary().into());
        ui.set_saved(true);
        *saved_clone.borrow_mut() = Some(modpack);
    });

    let ui_weak = ui.as_weak();
    ui.on_continue_clicked(move || {
        if let Some(ui) = ui_weak.upgrade() {
            if let Err(e) = ui.hide() {
                tracing::warn!("Failed to hide modpack configuration window: {}", e);
            }
        }
    });

    ui.run().context("Modpack configuration window failed")?;

    let result = saved.borrow_mut().take();
    if result.is_none() {
        tracing::info!("Modpack configuration window closed without saving");
    }
    Ok(result)
}
