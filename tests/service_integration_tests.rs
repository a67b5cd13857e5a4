//! Integration tests for the download services
//!
//! A local axum server stands in for GitHub (web + API) and a plain file host.
//! These tests verify:
//! - Downloader success, HTTP errors and overwrite rules
//! - GitHub release lookup, asset URLs and repository page resolution
//! - Full modpack syncs from a URL and from a GitHub release
//! - Cancellation of a running sync, queued or mid-body
//! - Bodies that fail partway never leave a truncated file

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header::ACCEPT};
use axum::routing::get;
use axum::{Json, Router};
use camino::{Utf8Path, Utf8PathBuf};
use futures_util::{StreamExt, stream};
use modfetch::models::{AppConfig, DownloadStatus, FetchSettings};
use modfetch::services::{DownloadError, Downloader, GitHubClient, GitHubError, ModpackService};
use modfetch::{ConfigManager, StateChange, StateManager};
use serde_json::{Value, json};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;

#[derive(Clone)]
struct Host {
    base: Arc<String>,
}

fn modpack_text(base: &str) -> String {
    format!(
        "# test modpack\nsodium={base}/files/sodium.jar\nbroken={base}/files/missing.jar\nlithium={base}/gh/deus/lithium\n"
    )
}

fn release_json(base: &str, owner: &str, tag: &str) -> Value {
    let assets = if owner == "empty" {
        json!([])
    } else {
        json!([
            {
                "name": "lithium-1.0-sources.zip",
                "browser_download_url": format!("{base}/files/sources.zip"),
                "size": 3
            },
            {
                "name": "lithium-1.0.jar",
                "browser_download_url": format!("{base}/files/lithium-1.0.jar"),
                "size": 19
            },
            {
                "name": "modpack.conf",
                "browser_download_url": format!("{base}/gh/{owner}/pack/releases/download/{tag}/modpack.conf"),
                "size": 120
            }
        ])
    };
    json!({ "tag_name": tag, "name": format!("Release {tag}"), "assets": assets })
}

fn require_github_accept(headers: &HeaderMap) -> Result<(), StatusCode> {
    match headers.get(ACCEPT).and_then(|v| v.to_str().ok()) {
        Some("application/vnd.github+json") => Ok(()),
        _ => Err(StatusCode::NOT_ACCEPTABLE),
    }
}

async fn serve_file(Path(name): Path<String>) -> Result<Vec<u8>, StatusCode> {
    match name.as_str() {
        "missing.jar" => Err(StatusCode::NOT_FOUND),
        "slow.jar" => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(b"too late".to_vec())
        }
        _ => Ok(format!("jar:{}", name).into_bytes()),
    }
}

/// Sends the headers and a first chunk, then drops the connection.
async fn serve_broken_body() -> Body {
    let chunks: Vec<Result<Bytes, io::Error>> = vec![
        Ok(Bytes::from_static(b"first half of the jar")),
        Err(io::Error::new(io::ErrorKind::ConnectionReset, "host went away")),
    ];
    Body::from_stream(stream::iter(chunks))
}

/// Sends the headers and a first chunk, then never finishes.
async fn serve_stalled_body() -> Body {
    let first = stream::iter([Ok::<_, io::Error>(Bytes::from_static(b"first chunk"))]);
    Body::from_stream(first.chain(stream::pending()))
}

async fn serve_modpack(State(host): State<Host>) -> String {
    modpack_text(&host.base)
}

async fn serve_slow_modpack(State(host): State<Host>) -> String {
    format!(
        "slow={base}/files/slow.jar\nsodium={base}/files/sodium.jar\n",
        base = host.base
    )
}

async fn serve_stalled_modpack(State(host): State<Host>) -> String {
    format!("stalled={}/stalled/stalled.jar\n", host.base)
}

async fn serve_release_asset(
    State(host): State<Host>,
    Path((_owner, _repo, _tag, asset)): Path<(String, String, String, String)>,
) -> Result<String, StatusCode> {
    match asset.as_str() {
        "modpack.conf" => Ok(modpack_text(&host.base)),
        _ => Err(StatusCode::NOT_FOUND),
    }
}

async fn latest_release(
    State(host): State<Host>,
    headers: HeaderMap,
    Path((owner, _repo)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    require_github_accept(&headers)?;
    Ok(Json(release_json(&host.base, &owner, "v2")))
}

async fn tagged_release(
    State(host): State<Host>,
    headers: HeaderMap,
    Path((owner, _repo, tag)): Path<(String, String, String)>,
) -> Result<Json<Value>, StatusCode> {
    require_github_accept(&headers)?;
    if tag != "v1" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(release_json(&host.base, &owner, &tag)))
}

/// Start the stand-in host on a random port and return its base URL.
async fn start_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let host = Host {
        base: Arc::new(base.clone()),
    };

    let app = Router::new()
        .route("/files/:name", get(serve_file))
        .route("/modpack.conf", get(serve_modpack))
        .route("/slow-modpack.conf", get(serve_slow_modpack))
        .route("/stalled-modpack.conf", get(serve_stalled_modpack))
        .route("/broken/:name", get(serve_broken_body))
        .route("/stalled/:name", get(serve_stalled_body))
        .route(
            "/gh/:owner/:repo/releases/download/:tag/:asset",
            get(serve_release_asset),
        )
        .route("/api/repos/:owner/:repo/releases/latest", get(latest_release))
        .route(
            "/api/repos/:owner/:repo/releases/tags/:tag",
            get(tagged_release),
        )
        .with_state(host);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    base
}

fn temp_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, path)
}

fn github_client(base: &str, settings: &FetchSettings) -> GitHubClient {
    GitHubClient::with_bases(
        Downloader::new(settings).unwrap(),
        &format!("{}/api", base),
        &format!("{}/gh", base),
    )
}

fn service_for(
    base: &str,
    config_dir: &Utf8Path,
    concurrency: usize,
) -> (ModpackService, Arc<StateManager>) {
    let settings = FetchSettings::default();
    let config_manager = ConfigManager::new(config_dir).unwrap();
    let downloader = Downloader::new(&settings).unwrap();
    let github = github_client(base, &settings);
    let state = Arc::new(StateManager::new());

    let service = ModpackService::with_clients(
        config_manager,
        downloader,
        github,
        state.clone(),
        concurrency,
    );
    (service, state)
}

// ===== Downloader =====

#[tokio::test]
async fn test_download_writes_body() {
    let base = start_host().await;
    let (_temp, dir) = temp_dir();
    let dest = dir.join("mods").join("sodium.jar");

    let downloader = Downloader::new(&FetchSettings::default()).unwrap();
    let outcome = downloader
        .download_file(&format!("{}/files/sodium.jar", base), &dest)
        .await
        .unwrap();

    assert_eq!(outcome.status, DownloadStatus::Downloaded);
    assert_eq!(outcome.bytes, "jar:sodium.jar".len() as u64);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "jar:sodium.jar");
    assert!(!Downloader::part_path(&dest).exists());
}

#[tokio::test]
async fn test_download_http_error_leaves_no_file() {
    let base = start_host().await;
    let (_temp, dir) = temp_dir();
    let dest = dir.join("missing.jar");

    let downloader = Downloader::new(&FetchSettings::default()).unwrap();
    let err = downloader
        .download_file(&format!("{}/files/missing.jar", base), &dest)
        .await
        .unwrap_err();

    assert!(
        matches!(&err, DownloadError::HttpStatus { status, .. } if status.as_u16() == 404),
        "unexpected error: {:?}",
        err
    );
    assert!(!dest.exists());
    assert!(!Downloader::part_path(&dest).exists());
}

#[tokio::test]
async fn test_download_overwrites_when_enabled() {
    let base = start_host().await;
    let (_temp, dir) = temp_dir();
    let dest = dir.join("sodium.jar");
    std::fs::write(&dest, "stale").unwrap();

    let downloader = Downloader::new(&FetchSettings::default()).unwrap();
    downloader
        .download_file(&format!("{}/files/sodium.jar", base), &dest)
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "jar:sodium.jar");
}

#[tokio::test]
async fn test_download_failing_midway_keeps_existing_file() {
    let base = start_host().await;
    let (_temp, dir) = temp_dir();
    let dest = dir.join("sodium.jar");
    std::fs::write(&dest, "previous version").unwrap();

    let downloader = Downloader::new(&FetchSettings::default()).unwrap();
    let result = downloader
        .download_file(&format!("{}/broken/sodium.jar", base), &dest)
        .await;

    assert!(result.is_err(), "truncated body was accepted: {:?}", result);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "previous version");
    assert!(!Downloader::part_path(&dest).exists());
}

#[tokio::test]
async fn test_download_failing_midway_leaves_no_file() {
    let base = start_host().await;
    let (_temp, dir) = temp_dir();
    let dest = dir.join("mods").join("lithium.jar");

    let downloader = Downloader::new(&FetchSettings::default()).unwrap();
    let result = downloader
        .download_file(&format!("{}/broken/lithium.jar", base), &dest)
        .await;

    assert!(result.is_err());
    assert!(!dest.exists());
    assert!(!Downloader::part_path(&dest).exists());
}

#[tokio::test]
async fn test_fetch_text() {
    let base = start_host().await;
    let downloader = Downloader::new(&FetchSettings::default()).unwrap();

    let text = downloader
        .fetch_text(&format!("{}/modpack.conf", base))
        .await
        .unwrap();

    assert!(text.starts_with("# test modpack"));
    assert!(text.contains(&format!("sodium={}/files/sodium.jar", base)));
}

// ===== GitHub =====

#[tokio::test]
async fn test_fetch_latest_and_tagged_release() {
    let base = start_host().await;
    let github = github_client(&base, &FetchSettings::default());

    let latest = github.fetch_release("deus", "lithium", None).await.unwrap();
    assert_eq!(latest.tag_name, "v2");
    assert_eq!(latest.assets.len(), 3);

    let tagged = github
        .fetch_release("deus", "lithium", Some("v1"))
        .await
        .unwrap();
    assert_eq!(tagged.tag_name, "v1");

    let err = github
        .fetch_release("deus", "lithium", Some("v9"))
        .await
        .unwrap_err();
    assert!(
        matches!(&err, GitHubError::Api { status, .. } if status.as_u16() == 404),
        "unexpected error: {:?}",
        err
    );
}

#[tokio::test]
async fn test_resolve_repository_page_to_jar_asset() {
    let base = start_host().await;
    let github = github_client(&base, &FetchSettings::default());

    let url = github
        .resolve_download_url(&format!("{}/gh/deus/lithium/releases/latest", base))
        .await
        .unwrap();
    assert_eq!(url, format!("{}/files/lithium-1.0.jar", base));

    let err = github
        .resolve_download_url(&format!("{}/gh/empty/nothing", base))
        .await
        .unwrap_err();
    assert!(matches!(err, GitHubError::NoJarAsset { .. }));
}

#[tokio::test]
async fn test_download_release_asset() {
    let base = start_host().await;
    let (_temp, dir) = temp_dir();
    let github = github_client(&base, &FetchSettings::default());
    let dest = dir.join("modpack.conf");

    github
        .download_release_asset("deus", "pack", "v1", "modpack.conf", &dest)
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(&dest).unwrap(), modpack_text(&base));
}

// ===== Modpack sync =====

#[tokio::test]
async fn test_sync_from_url_source() {
    let base = start_host().await;
    let (_temp, dir) = temp_dir();
    let jar_dir = dir.join("mods");
    let (service, state) = service_for(&base, &dir, 2);
    let mut rx = state.subscribe();

    let app_config = AppConfig::from_url(format!("{}/modpack.conf", base), &jar_dir);
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let report = service.sync(&app_config, cancel_rx).await.unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.downloaded, vec!["sodium", "lithium"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "broken");
    assert!(report.failed[0].1.contains("404"));
    assert!(!report.is_success());

    assert_eq!(
        std::fs::read_to_string(jar_dir.join("sodium.jar")).unwrap(),
        "jar:sodium.jar"
    );
    assert_eq!(
        std::fs::read_to_string(jar_dir.join("lithium.jar")).unwrap(),
        "jar:lithium-1.0.jar"
    );
    assert!(!jar_dir.join("broken.jar").exists());

    // The remote list replaces the local modpack.conf
    assert_eq!(
        std::fs::read_to_string(dir.join("modpack.conf")).unwrap(),
        modpack_text(&base)
    );

    let snapshot = state.snapshot();
    assert!(!snapshot.is_downloading);
    assert!(snapshot.is_modpack_configured);
    assert_eq!(snapshot.progress, 3);

    let mut reset = false;
    let mut started = false;
    let mut finished = None;
    while let Ok(change) = rx.try_recv() {
        match change {
            StateChange::StateReset => {
                assert!(!started, "reset must come before the download starts");
                reset = true;
            }
            StateChange::DownloadStarted { total_mods } => {
                started = true;
                assert_eq!(total_mods, 3);
            }
            StateChange::DownloadFinished {
                downloaded,
                failed,
                skipped,
            } => finished = Some((downloaded, failed, skipped)),
            _ => {}
        }
    }
    assert!(reset);
    assert!(started);
    assert_eq!(finished, Some((2, 1, 0)));
}

#[tokio::test]
async fn test_sync_from_latest_github_release() {
    let base = start_host().await;
    let (_temp, dir) = temp_dir();
    let jar_dir = dir.join("mods");
    let (service, _state) = service_for(&base, &dir, 1);

    let app_config = AppConfig {
        owner: Some("deus".to_string()),
        repo: Some("pack".to_string()),
        tag: None,
        modpack_config_url: None,
        jar_download_path: jar_dir.clone(),
    };
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let report = service.sync(&app_config, cancel_rx).await.unwrap();

    assert_eq!(report.downloaded, vec!["sodium", "lithium"]);
    assert_eq!(report.failed.len(), 1);
    assert!(jar_dir.join("lithium.jar").exists());
}

#[tokio::test]
async fn test_sync_fails_when_modpack_list_is_unavailable() {
    let base = start_host().await;
    let (_temp, dir) = temp_dir();
    let (service, state) = service_for(&base, &dir, 2);

    let app_config = AppConfig::from_url(format!("{}/files/missing.jar", base), dir.join("mods"));
    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let err = service.sync(&app_config, cancel_rx).await.unwrap_err();

    assert!(format!("{:#}", err).contains("404"));
    assert!(!state.read(|s| s.is_downloading));
    assert!(!dir.join("mods").exists());
}

#[tokio::test]
async fn test_cancel_running_sync() {
    let base = start_host().await;
    let (_temp, dir) = temp_dir();
    let jar_dir = dir.join("mods");
    let (service, state) = service_for(&base, &dir, 1);

    let app_config = AppConfig::from_url(format!("{}/slow-modpack.conf", base), &jar_dir);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let sync = tokio::spawn(async move { service.sync(&app_config, cancel_rx).await });

    // Wait until the slow mod holds the only permit
    let started = tokio::time::timeout(Duration::from_secs(5), async {
        while state.read(|s| s.current_mod.as_deref() != Some("slow")) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(started.is_ok(), "slow download never started");

    cancel_tx.send(true).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(5), sync)
        .await
        .expect("sync did not stop after cancellation")
        .unwrap()
        .unwrap();

    assert_eq!(report.cancelled, vec!["slow", "sodium"]);
    assert!(report.downloaded.is_empty());
    assert!(report.was_cancelled());
    assert!(!jar_dir.join("slow.jar").exists());
    assert!(!state.read(|s| s.is_downloading));
    assert_eq!(state.read(|s| s.cancelled_mods.len()), 2);
}

#[tokio::test]
async fn test_cancel_during_body_removes_part_file() {
    let base = start_host().await;
    let (_temp, dir) = temp_dir();
    let jar_dir = dir.join("mods");
    let part = Downloader::part_path(&jar_dir.join("stalled.jar"));
    let (service, state) = service_for(&base, &dir, 1);

    let app_config = AppConfig::from_url(format!("{}/stalled-modpack.conf", base), &jar_dir);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let sync = tokio::spawn(async move { service.sync(&app_config, cancel_rx).await });

    // The part file appears once the headers are in and the body is streaming
    let streaming = tokio::time::timeout(Duration::from_secs(5), async {
        while !part.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(streaming.is_ok(), "stalled download never started writing");

    cancel_tx.send(true).unwrap();

    let report = tokio::time::timeout(Duration::from_secs(5), sync)
        .await
        .expect("sync did not stop after cancellation")
        .unwrap()
        .unwrap();

    assert_eq!(report.cancelled, vec!["stalled"]);
    assert!(!part.exists());
    assert!(!jar_dir.join("stalled.jar").exists());
    assert_eq!(state.read(|s| s.cancelled_mods.len()), 1);
}
