//! Services module - business logic for fetching a modpack.
//!
//! The services have no dependencies on the UI layer. Progress is reported
//! through [`StateManager`](crate::state::StateManager) events.
//!
//! # Components
//!
//! - [`Downloader`]: HTTP GET to a file, streamed through a `.part` file
//! - [`GitHubClient`]: release asset URLs, the releases API, repository page resolution
//! - [`ModpackService`]: fetches `modpack.conf` from the configured source and
//!   downloads every mod with bounded concurrency and cancellation
//!
//! # Usage Example
//!
//! ```ignore
//! use modfetch::services::ModpackService;
//!
//! let service = ModpackService::new(config_manager, &settings, state)?;
//! let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
//!
//! let report = service.sync(&app_config, cancel_rx).await?;
//! println!("{}", report.summary());
//! ```

pub mod download;
pub mod github;
pub mod modpack;

pub use download::{DownloadError, DownloadOutcome, Downloader};
pub use github::{GitHubClient, GitHubError, Release, ReleaseAsset, RepoRef};
pub use modpack::{ModpackService, SyncReport};
