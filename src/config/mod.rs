pub mod kv;

use crate::models::config::keys;
use crate::models::{AppConfig, ModpackConfig, RawAppConfig, UserConfig};
use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

pub use kv::{KvDocument, LineError, RejectedLine};

/// Environment variable that selects the configuration directory.
pub const CONFIG_DIR_ENV: &str = "MODFETCH_CONFIG_DIR";

/// Default prefix for environment overrides of `app.conf` keys.
pub const DEFAULT_ENV_PREFIX: &str = "MODFETCH";

/// Configuration manager for the files modfetch reads and writes.
///
/// Manages three files inside one directory:
/// - `app.conf`: modpack source and jar download path (`key=value`)
/// - `modpack.conf`: mod name to URL list (`key=value`)
/// - `modfetch.yaml`: optional downloader settings (YAML)
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    app_config_path: Utf8PathBuf,
    modpack_config_path: Utf8PathBuf,
    settings_path: Utf8PathBuf,
    env_prefix: String,
}

impl ConfigManager {
    /// Create a new ConfigManager rooted at `config_dir`, creating the directory if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            app_config_path: config_dir.join("app.conf"),
            modpack_config_path: config_dir.join("modpack.conf"),
            settings_path: config_dir.join("modfetch.yaml"),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            config_dir,
        })
    }

    /// Directory from `MODFETCH_CONFIG_DIR`, or the current directory.
    pub fn default_dir() -> Utf8PathBuf {
        std::env::var(CONFIG_DIR_ENV)
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(Utf8PathBuf::from)
            .unwrap_or_else(|| Utf8PathBuf::from("."))
    }

    /// Use a different prefix for environment overrides (`<PREFIX>_JAR_DOWNLOAD_PATH`, ...).
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn app_config_exists(&self) -> bool {
        self.app_config_path.exists()
    }

    pub fn modpack_config_exists(&self) -> bool {
        self.modpack_config_path.exists()
    }

    /// Load `app.conf`, layering environment overrides on top of the file values.
    pub fn load_app_config(&self) -> Result<AppConfig> {
        let document = kv::read_kv_file(&self.app_config_path)?;
        document.log_rejected(&self.app_config_path);

        if document.is_empty() {
            bail!(
                "The application configuration file is empty: {}",
                self.app_config_path
            );
        }

        let mut builder = config::Config::builder();
        for (key, value) in &document.entries {
            match keys::ALL.iter().find(|(file_key, _)| *file_key == key.as_str()) {
                Some((_, layered_key)) => {
                    builder = builder
                        .set_default(*layered_key, value.clone())
                        .with_context(|| format!("Invalid value for '{}'", key))?;
                }
                None => {
                    tracing::warn!(
                        "Ignoring unknown key '{}' in {}",
                        key,
                        self.app_config_path
                    );
                }
            }
        }

        let layered = builder
            .add_source(config::Environment::with_prefix(&self.env_prefix))
            .build()
            .context("Failed to layer application configuration")?;

        let raw: RawAppConfig = layered
            .try_deserialize()
            .context("Failed to read application configuration values")?;

        let app_config = AppConfig::try_from(raw)
            .with_context(|| format!("Invalid application config: {}", self.app_config_path))?;

        tracing::info!(
            "Loaded app config from {} (source: {:?})",
            self.app_config_path,
            app_config.modpack_source()
        );
        Ok(app_config)
    }

    /// Create or overwrite `app.conf`.
    pub fn save_app_config(&self, config: &AppConfig) -> Result<()> {
        config.validate().context("Refusing to save invalid app config")?;

        let entries = config.to_entries();
        kv::write_kv_file(
            &self.app_config_path,
            entries.iter().map(|(key, value)| (*key, value.as_str())),
        )?;

        tracing::info!("Saved app config to {}", self.app_config_path);
        Ok(())
    }

    /// Load `modpack.conf`. Invalid or duplicate lines are logged and skipped.
    pub fn load_modpack_config(&self) -> Result<ModpackConfig> {
        let document = kv::read_kv_file(&self.modpack_config_path)?;
        document.log_rejected(&self.modpack_config_path);

        let (modpack, errors) = ModpackConfig::from_entries(&document.entries);
        for error in errors {
            tracing::warn!("Skipping modpack entry in {}: {}", self.modpack_config_path, error);
        }

        tracing::info!(
            "Loaded {} mods from {}",
            modpack.len(),
            self.modpack_config_path
        );
        Ok(modpack)
    }

    /// Create or overwrite `modpack.conf`.
    pub fn save_modpack_config(&self, modpack: &ModpackConfig) -> Result<()> {
        kv::write_kv_file(
            &self.modpack_config_path,
            modpack
                .entries()
                .iter()
                .map(|entry| (entry.name.as_str(), entry.url.as_str())),
        )?;

        tracing::info!(
            "Saved {} mods to {}",
            modpack.len(),
            self.modpack_config_path
        );
        Ok(())
    }

    /// Load `modfetch.yaml`, or defaults if it doesn't exist.
    pub fn load_user_config(&self) -> Result<UserConfig> {
        if !self.settings_path.exists() {
            tracing::debug!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
            return Ok(UserConfig::default());
        }

        let file_contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        let config: UserConfig = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(config)
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn app_config_path(&self) -> &Utf8Path {
        &self.app_config_path
    }

    pub fn modpack_config_path(&self) -> &Utf8Path {
        &self.modpack_config_path
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}
