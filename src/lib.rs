//! # luaupdate Core Library
//!
//! This crate contains the logic behind the `luaupdate` tool: it asks GitHub
//! for the latest Luau release, downloads the asset built for the running
//! platform (or the source archive when there is none), installs it, and
//! remembers the installed version so that later runs do nothing until a new
//! release appears.
//!
//! ## Modules Overview
//! - [`platform`] – Maps the running OS to a release asset name
//! - [`release`] – Release metadata and the HTTP client for the release host
//! - [`cache`] – Settings record and downloaded artifacts under `.cache/`
//! - [`decision`] – Whether to fetch, what to fetch, and fetching it
//! - [`installer`] – Archive extraction and source builds
//! - [`install_dir`] – Where to install and putting that on `PATH`
//! - [`ownership`] – Handing created files back to the user behind `sudo`
//! - [`updater`] – A complete run, in order
//! - [`config`] – Run configuration and `luaupdate.toml`
//! - [`error`] – Error kinds and exit codes


pub mod error;
pub mod config;
pub mod platform;
pub mod release;
pub mod ownership;
pub mod cache;
pub mod decision;
pub mod installer;
pub mod install_dir;
pub mod updater;

pub use error::{UpdateError, UpdateResult};
pub use config::Config;
pub use platform::{resolve_asset_identifier, Platform};
pub use release::{Asset, GitHubReleaseHost, ReleaseHost, ReleaseMetadata};
pub use cache::{CacheSettings, CacheStore};
pub use decision::{acquire, decide, ArtifactSource, Decision, FetchPlan};
pub use installer::{InstallStrategy, Installer, SourceBuilder};
pub use updater::{Outcome, Updater};
