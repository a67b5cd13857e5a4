//! Data models for modfetch.
//!
//! - [`AppState`]: runtime state (configuration status, download progress, results)
//! - [`AppConfig`]: `app.conf`, where to get the modpack list and where jars go
//! - [`ModpackConfig`]: `modpack.conf`, the ordered list of mods
//! - [`UserConfig`]: `modfetch.yaml`, optional downloader settings
//!
//! Config structs are plain data; reading and writing them is done by
//! [`ConfigManager`](crate::config::ConfigManager).

pub mod app_state;
pub mod config;

pub use app_state::{AppState, DownloadStatus};
pub use config::{
    AppConfig, AppConfigError, FetchSettings, MAX_CONCURRENT_DOWNLOADS, MODPACK_ASSET_NAME,
    ModEntry, ModpackConfig, ModpackError, ModpackSource, RawAppConfig, UserConfig,
    extract_mod_name,
};
