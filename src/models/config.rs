use crate::config::kv::{self, LineError};
use camino::Utf8PathBuf;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

/// Key names used in `app.conf`.
pub mod keys {
    pub const OWNER: &str = "owner";
    pub const REPO: &str = "repo";
    pub const TAG: &str = "tag";
    pub const MODPACK_CONFIG_URL: &str = "modpackConfigUrl";
    pub const JAR_DOWNLOAD_PATH: &str = "jarDownloadPath";

    /// File key paired with the snake_case name used for layering and env overrides
    pub const ALL: [(&str, &str); 5] = [
        (OWNER, "owner"),
        (REPO, "repo"),
        (TAG, "tag"),
        (MODPACK_CONFIG_URL, "modpack_config_url"),
        (JAR_DOWNLOAD_PATH, "jar_download_path"),
    ];
}

/// Name of the release asset that carries the modpack list.
pub const MODPACK_ASSET_NAME: &str = "modpack.conf";

/// Upper bound for parallel downloads regardless of settings.
pub const MAX_CONCURRENT_DOWNLOADS: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppConfigError {
    #[error("required key '{0}' is missing from the application configuration")]
    MissingKey(&'static str),

    #[error("both 'owner' and 'repo' are needed to use a GitHub release as modpack source")]
    IncompleteGitHubSource,

    #[error("the value of '{key}' cannot be stored in app.conf: {reason}")]
    Unwritable { key: &'static str, reason: LineError },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModpackError {
    #[error("the mod URL cannot be empty")]
    EmptyUrl,

    #[error("the mod name '{0}' has already been entered")]
    DuplicateName(String),

    #[error("the mod URL '{0}' has already been entered")]
    DuplicateUrl(String),

    #[error("the mod '{name}' would be saved as '{file_name}', which another mod already uses")]
    DuplicateFileName { name: String, file_name: String },

    #[error("the mod '{name}' cannot be stored in modpack.conf: {reason}")]
    Unwritable { name: String, reason: LineError },
}

/// Where the list of mods comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModpackSource {
    /// A remote `modpack.conf` fetched from a direct URL
    Url(String),

    /// The `modpack.conf` asset of a GitHub release (latest when `tag` is None)
    GitHubRelease {
        owner: String,
        repo: String,
        tag: Option<String>,
    },

    /// The local `modpack.conf`, used as-is
    Local,
}

/// Application configuration from `app.conf`.
///
/// Empty values are treated as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub tag: Option<String>,
    pub modpack_config_url: Option<String>,
    pub jar_download_path: Utf8PathBuf,
}

/// Flat view of `app.conf` keyed by snake_case names, as produced by the
/// `config` layering in [`crate::config::ConfigManager`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawAppConfig {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub modpack_config_url: Option<String>,
    #[serde(default)]
    pub jar_download_path: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryFrom<RawAppConfig> for AppConfig {
    type Error = AppConfigError;

    fn try_from(raw: RawAppConfig) -> Result<Self, Self::Error> {
        let jar_download_path = non_empty(raw.jar_download_path)
            .ok_or(AppConfigError::MissingKey(keys::JAR_DOWNLOAD_PATH))?;

        let config = Self {
            owner: non_empty(raw.owner),
            repo: non_empty(raw.repo),
            tag: non_empty(raw.tag),
            modpack_config_url: non_empty(raw.modpack_config_url),
            jar_download_path: Utf8PathBuf::from(jar_download_path),
        };
        config.validate()?;
        Ok(config)
    }
}

impl AppConfig {
    /// Config that reads the modpack list from a direct URL.
    pub fn from_url(url: impl Into<String>, jar_download_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            owner: None,
            repo: None,
            tag: None,
            modpack_config_url: Some(url.into()),
            jar_download_path: jar_download_path.into(),
        }
    }

    /// Config that only uses the local `modpack.conf`.
    pub fn local(jar_download_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            owner: None,
            repo: None,
            tag: None,
            modpack_config_url: None,
            jar_download_path: jar_download_path.into(),
        }
    }

    pub fn validate(&self) -> Result<(), AppConfigError> {
        if self.jar_download_path.as_str().trim().is_empty() {
            return Err(AppConfigError::MissingKey(keys::JAR_DOWNLOAD_PATH));
        }
        if self.owner.is_some() != self.repo.is_some() {
            return Err(AppConfigError::IncompleteGitHubSource);
        }
        for (key, value) in self.to_entries() {
            kv::check_entry(key, &value)
                .map_err(|reason| AppConfigError::Unwritable { key, reason })?;
        }
        Ok(())
    }

    pub fn modpack_source(&self) -> ModpackSource {
        if let Some(url) = &self.modpack_config_url {
            return ModpackSource::Url(url.clone());
        }

        match (&self.owner, &self.repo) {
            (Some(owner), Some(repo)) => ModpackSource::GitHubRelease {
                owner: owner.clone(),
                repo: repo.clone(),
                tag: self.tag.clone(),
            },
            _ => ModpackSource::Local,
        }
    }

    /// Entries in the order they are written to `app.conf`. Absent values are omitted.
    pub fn to_entries(&self) -> Vec<(&'static str, String)> {
        let mut entries = Vec::new();

        let optional = [
            (keys::MODPACK_CONFIG_URL, &self.modpack_config_url),
            (keys::OWNER, &self.owner),
            (keys::REPO, &self.repo),
            (keys::TAG, &self.tag),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                entries.push((key, value.clone()));
            }
        }

        entries.push((keys::JAR_DOWNLOAD_PATH, self.jar_download_path.to_string()));
        entries
    }
}

/// One line of `modpack.conf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModEntry {
    pub name: String,
    pub url: String,
}

impl ModEntry {
    /// File name the mod is saved under: `<name>.jar`.
    pub fn file_name(&self) -> String {
        let safe: String = self
            .name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();

        if safe.to_ascii_lowercase().ends_with(".jar") {
            safe
        } else {
            format!("{}.jar", safe)
        }
    }
}

/// Ordered list of mods from `modpack.conf`.
///
/// Names, URLs and target file names are unique within a modpack, and every
/// entry can be written back to `modpack.conf`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModpackConfig {
    entries: Vec<ModEntry>,
}

impl ModpackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, url: impl Into<String>) -> Result<(), ModpackError> {
        let name = name.into();
        let url = url.into().trim().to_string();

        if url.is_empty() {
            return Err(ModpackError::EmptyUrl);
        }
        if let Err(reason) = kv::check_entry(&name, &url) {
            return Err(ModpackError::Unwritable { name, reason });
        }
        if self.entries.iter().any(|e| e.name == name) {
            return Err(ModpackError::DuplicateName(name));
        }
        if self.entries.iter().any(|e| e.url == url) {
            return Err(ModpackError::DuplicateUrl(url));
        }

        let entry = ModEntry { name, url };
        let file_name = entry.file_name();
        if self
            .entries
            .iter()
            .any(|e| e.file_name().eq_ignore_ascii_case(&file_name))
        {
            return Err(ModpackError::DuplicateFileName {
                name: entry.name,
                file_name,
            });
        }

        self.entries.push(entry);
        Ok(())
    }

    /// Build a modpack from bare URLs, deriving each mod name from its URL.
    pub fn from_urls<I, S>(urls: I) -> Result<Self, ModpackError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut modpack = Self::new();
        for url in urls {
            let url = url.as_ref().trim();
            if url.is_empty() {
                return Err(ModpackError::EmptyUrl);
            }
            modpack.push(extract_mod_name(url), url)?;
        }
        Ok(modpack)
    }

    /// Build a modpack from already-parsed `key=value` entries.
    ///
    /// Entries that break the uniqueness rules are returned separately.
    pub fn from_entries(entries: &IndexMap<String, String>) -> (Self, Vec<ModpackError>) {
        let mut modpack = Self::new();
        let mut errors = Vec::new();

        for (name, url) in entries {
            if let Err(e) = modpack.push(name.clone(), url.clone()) {
                errors.push(e);
            }
        }

        (modpack, errors)
    }

    pub fn entries(&self) -> &[ModEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Human-readable listing, one `name=url` per line.
    pub fn summary(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}={}", e.name, e.url))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

static GITHUB_REPO_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https://github\.com/[^/]+/([^/?#]+)").expect("Invalid GitHub repo regex")
});

/// Derive a mod name from its URL.
///
/// GitHub URLs yield the repository name; other URLs yield the last path
/// segment without a `.jar` extension. Falls back to `"unknown"`.
pub fn extract_mod_name(url: &str) -> String {
    if let Some(caps) = GITHUB_REPO_NAME.captures(url) {
        return caps[1].trim_end_matches(".git").to_string();
    }

    let path = url.split(['?', '#']).next().unwrap_or_default();
    let after_scheme = path.split_once("://").map(|(_, rest)| rest).unwrap_or(path);

    after_scheme
        .split_once('/')
        .and_then(|(_, path)| path.rsplit('/').find(|segment| !segment.is_empty()))
        .map(|segment| {
            segment
                .strip_suffix(".jar")
                .or_else(|| segment.strip_suffix(".JAR"))
                .unwrap_or(segment)
                .to_string()
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Settings file (`modfetch.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(rename = "ModFetch_Settings", default)]
    pub fetch_settings: FetchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    #[serde(rename = "Request Timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(rename = "Max Concurrent Downloads", default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    #[serde(rename = "Overwrite Existing", default = "default_true")]
    pub overwrite_existing: bool,

    #[serde(rename = "User Agent", default = "default_user_agent")]
    pub user_agent: String,

    #[serde(rename = "Debug Mode", default)]
    pub debug_mode: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            max_concurrent_downloads: default_max_concurrent(),
            overwrite_existing: true,
            user_agent: default_user_agent(),
            debug_mode: false,
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.max(1))
    }

    /// Configured parallelism clamped to `1..=MAX_CONCURRENT_DOWNLOADS`.
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_downloads.clamp(1, MAX_CONCURRENT_DOWNLOADS)
    }
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_concurrent() -> usize {
    2
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("modfetch/{}", env!("CARGO_PKG_VERSION"))
}
