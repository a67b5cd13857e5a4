//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - app.conf loading and saving, including environment overrides
//! - Malformed and duplicate lines in key=value files
//! - modpack.conf ordering and uniqueness rules
//! - modfetch.yaml settings defaults
//! - Integration with StateManager

use camino::Utf8PathBuf;
use modfetch::config::kv;
use modfetch::models::{AppConfig, ModpackConfig, ModpackSource};
use modfetch::{ConfigManager, StateManager};
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

/// Each test gets its own env prefix so parallel tests never see each other's variables.
fn manager(config_path: &Utf8PathBuf, env_prefix: &str) -> ConfigManager {
    ConfigManager::new(config_path)
        .unwrap()
        .with_env_prefix(env_prefix)
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(manager.app_config_path(), config_path.join("app.conf"));
}

#[test]
fn test_config_dir_is_created() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let nested = config_path.join("nested").join("config");

    ConfigManager::new(&nested).unwrap();

    assert!(nested.is_dir());
}

#[test]
fn test_github_app_config_round_trip() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "MODFETCH_ITEST_ROUND_TRIP");

    let config = AppConfig {
        owner: Some("deus".to_string()),
        repo: Some("pack".to_string()),
        tag: Some("v1.2".to_string()),
        modpack_config_url: None,
        jar_download_path: Utf8PathBuf::from("/games/minecraft/mods"),
    };
    manager.save_app_config(&config).unwrap();

    let text = fs::read_to_string(manager.app_config_path()).unwrap();
    assert_eq!(
        text,
        "owner=deus\nrepo=pack\ntag=v1.2\njarDownloadPath=/games/minecraft/mods\n"
    );

    let loaded = manager.load_app_config().unwrap();
    assert_eq!(loaded, config);
    assert_eq!(
        loaded.modpack_source(),
        ModpackSource::GitHubRelease {
            owner: "deus".to_string(),
            repo: "pack".to_string(),
            tag: Some("v1.2".to_string()),
        }
    );
}

#[test]
fn test_environment_overrides_file_values() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "MODFETCH_ITEST_ENV");

    fs::write(
        manager.app_config_path(),
        "modpackConfigUrl=https://example.com/modpack.conf\njarDownloadPath=mods\n",
    )
    .unwrap();

    // SAFETY: the variable name is unique to this test
    unsafe {
        std::env::set_var("MODFETCH_ITEST_ENV_JAR_DOWNLOAD_PATH", "/override/mods");
    }
    let loaded = manager.load_app_config();
    unsafe {
        std::env::remove_var("MODFETCH_ITEST_ENV_JAR_DOWNLOAD_PATH");
    }

    let loaded = loaded.unwrap();
    assert_eq!(loaded.jar_download_path, Utf8PathBuf::from("/override/mods"));
    assert_eq!(
        loaded.modpack_config_url.as_deref(),
        Some("https://example.com/modpack.conf")
    );
}

#[test]
fn test_malformed_lines_are_skipped() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "MODFETCH_ITEST_MALFORMED");

    fs::write(
        manager.app_config_path(),
        "# comment\ngarbage\nowner=a=b\n=value\njarDownloadPath = mods \njarDownloadPath=other\n",
    )
    .unwrap();

    let document = kv::read_kv_file(manager.app_config_path()).unwrap();
    let rejected: Vec<usize> = document.rejected.iter().map(|r| r.line_number).collect();
    assert_eq!(rejected, vec![2, 3, 4, 6]);

    let loaded = manager.load_app_config().unwrap();
    assert_eq!(loaded, AppConfig::local("mods"));
}

#[test]
fn test_unwritable_app_config_is_not_saved() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "MODFETCH_ITEST_UNWRITABLE");

    manager.save_app_config(&AppConfig::local("mods")).unwrap();
    let before = fs::read_to_string(manager.app_config_path()).unwrap();

    let err = manager
        .save_app_config(&AppConfig::local("/games/mods=old"))
        .unwrap_err();
    assert!(format!("{:#}", err).contains("jarDownloadPath"));

    assert_eq!(fs::read_to_string(manager.app_config_path()).unwrap(), before);
    assert_eq!(manager.load_app_config().unwrap(), AppConfig::local("mods"));
}

#[test]
fn test_saved_modpack_reads_back_unchanged() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let modpack = ModpackConfig::from_urls([
        "https://github.com/CaffeineMC/sodium",
        "https://cdn.example.com/mods/lithium.jar",
    ])
    .unwrap();
    manager.save_modpack_config(&modpack).unwrap();

    let document = kv::read_kv_file(manager.modpack_config_path()).unwrap();
    assert!(document.rejected.is_empty());
    assert_eq!(manager.load_modpack_config().unwrap(), modpack);
}

#[test]
fn test_missing_jar_path_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "MODFETCH_ITEST_MISSING");

    fs::write(
        manager.app_config_path(),
        "modpackConfigUrl=https://example.com/modpack.conf\n",
    )
    .unwrap();

    let err = manager.load_app_config().unwrap_err();
    assert!(format!("{:#}", err).contains("jarDownloadPath"));
}

#[test]
fn test_missing_app_config_file_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "MODFETCH_ITEST_NO_FILE");

    assert!(!manager.app_config_exists());
    assert!(manager.load_app_config().is_err());
}

#[test]
fn test_modpack_config_preserves_order() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    let mut modpack = ModpackConfig::new();
    modpack.push("sodium", "https://github.com/CaffeineMC/sodium").unwrap();
    modpack.push("lithium", "https://cdn.example.com/lithium.jar").unwrap();
    modpack.push("iris", "https://cdn.example.com/iris.jar").unwrap();
    manager.save_modpack_config(&modpack).unwrap();

    let loaded = manager.load_modpack_config().unwrap();
    assert_eq!(loaded, modpack);
    assert_eq!(loaded.names(), vec!["sodium", "lithium", "iris"]);
}

#[test]
fn test_modpack_duplicates_are_skipped() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        manager.modpack_config_path(),
        "a=https://x.example/a.jar\nb=https://x.example/a.jar\na=https://x.example/other.jar\nc=https://x.example/c.jar\nbroken\n",
    )
    .unwrap();

    let loaded = manager.load_modpack_config().unwrap();
    assert_eq!(loaded.names(), vec!["a", "c"]);
}

#[test]
fn test_settings_defaults_fill_missing_keys() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        manager.settings_path(),
        "ModFetch_Settings:\n  Max Concurrent Downloads: 4\n  Overwrite Existing: false\n",
    )
    .unwrap();

    let settings = manager.load_user_config().unwrap().fetch_settings;
    assert_eq!(settings.concurrency(), 4);
    assert!(!settings.overwrite_existing);
    assert_eq!(settings.request_timeout, 120);
    assert!(!settings.debug_mode);
}

#[test]
fn test_invalid_settings_yaml_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        manager.settings_path(),
        "ModFetch_Settings:\n  Request Timeout: soon\n",
    )
    .unwrap();

    assert!(manager.load_user_config().is_err());
}

#[test]
fn test_config_with_state_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = manager(&config_path, "MODFETCH_ITEST_STATE");
    let state_manager = StateManager::new();

    manager
        .save_app_config(&AppConfig::from_url(
            "https://example.com/modpack.conf",
            "mods",
        ))
        .unwrap();
    let mut settings = manager.load_user_config().unwrap().fetch_settings;
    settings.max_concurrent_downloads = 3;

    state_manager.set_app_config(&manager.load_app_config().unwrap());
    state_manager.load_settings(&settings);

    let state = state_manager.snapshot();
    assert!(state.is_app_configured);
    assert_eq!(state.max_concurrent_downloads, 3);
    assert_eq!(
        state.modpack_source,
        Some(ModpackSource::Url(
            "https://example.com/modpack.conf".to_string()
        ))
    );
}
