//! One update run, start to finish.
//!
//! The order matters: settings are read before anything else and written
//! only after the install succeeded, so an interrupted run is retried by
//! simply running again.

use std::path::PathBuf;
use log::{info, warn};
use crate::cache::CacheStore;
use crate::config::Config;
use crate::decision::{acquire, artifact_dir, decide, Decision, FetchPlan};
use crate::error::{UpdateError, UpdateResult};
use crate::install_dir::{self, Environment, InstallDir};
use crate::installer::{CMakeBuilder, Installer};
use crate::ownership::InvokingUser;
use crate::platform::{resolve_asset_identifier, Platform};
use crate::release::ReleaseHost;

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The latest release was already installed; nothing was touched.
    UpToDate { version: String },
    Installed {
        version: String,
        directory: PathBuf,
        files: Vec<PathBuf>,
        /// Whether the artifact came from the cache instead of the network.
        from_cache: bool,
        /// Whether the install was built from the source archive.
        from_source: bool,
    },
}

pub struct Updater<'a> {
    config: &'a Config,
    host: &'a dyn ReleaseHost,
    cache: CacheStore,
    installer: Installer,
    platform: Platform,
    owner: InvokingUser,
    env: Environment,
}

impl<'a> Updater<'a> {
    /// Sets up a run for the current process: detected user, environment and
    /// platform (unless overridden in `config`), CMake for source builds.
    pub fn new(config: &'a Config, host: &'a dyn ReleaseHost) -> UpdateResult<Self> {
        let owner = InvokingUser::detect();
        if owner.is_elevated() {
            info!("Files created by this run will belong to {}", owner.name);
        }
        let platform = config.platform();
        let installer = Installer::new(
            owner.clone(),
            Box::new(CMakeBuilder::new(platform.executable_extension())),
        );
        Self::with_parts(config, host, platform, owner, Environment::capture(), installer)
    }

    /// Sets up a run with explicit collaborators.
    ///
    /// `platform` is used as given; `config.platform` is not consulted.
    pub fn with_parts(
        config: &'a Config,
        host: &'a dyn ReleaseHost,
        platform: Platform,
        owner: InvokingUser,
        env: Environment,
        installer: Installer,
    ) -> UpdateResult<Self> {
        let cache = CacheStore::open(&config.cache_dir, owner.clone())?;
        Ok(Self {
            config,
            host,
            cache,
            installer,
            platform,
            owner,
            env,
        })
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn run(&self) -> UpdateResult<Outcome> {
        let _lock = self.cache.lock()?;
        let mut settings = self.cache.read_settings()?;
        let metadata = self.host.latest_release()?;
        info!(
            "Latest release is {}, installed is {}",
            metadata.version_tag,
            settings.installed_version().unwrap_or("none")
        );

        let asset_name = resolve_asset_identifier(&self.platform);
        let plan = match decide(
            &metadata,
            settings.installed_version(),
            asset_name.as_deref(),
            &self.cache,
            self.config.force,
        ) {
            Decision::Skip { version } => return Ok(Outcome::UpToDate { version }),
            Decision::Fetch(plan) => plan,
        };

        if plan.is_source_archive() && !self.installer.can_build_from_source() {
            return Err(UpdateError::UnsupportedPlatform(format!(
                "no prebuilt asset for {} in release {} and no build tool to compile the source archive",
                self.platform, plan.version
            )));
        }

        let artifact = acquire(&plan, self.host, &self.cache)?;
        let target = self.installation_dir(&plan);
        target.prepare(&self.owner, &self.env)?;

        let files = self.installer.install(plan.strategy, &artifact, &target.path)?;
        info!("Installed {} files into {}", files.len(), target.path.display());

        settings.set_installed_version(plan.version.as_str());
        self.cache.write_settings(&settings)?;

        Ok(Outcome::Installed {
            version: plan.version.clone(),
            directory: target.path,
            files,
            from_cache: !plan.needs_download(),
            from_source: plan.is_source_archive(),
        })
    }

    fn installation_dir(&self, plan: &FetchPlan) -> InstallDir {
        if let Some(dir) = &self.config.install_dir {
            return InstallDir::explicit(dir);
        }
        match install_dir::resolve(&self.platform, &self.owner, &self.env) {
            Some(dir) => dir,
            None => {
                let fallback = artifact_dir(&plan.artifact_path);
                warn!(
                    "No installation directory for {}, installing into {}",
                    self.platform,
                    fallback.display()
                );
                InstallDir::explicit(fallback)
            }
        }
    }
}
