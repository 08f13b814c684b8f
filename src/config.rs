use std::path::{Path, PathBuf};
use std::time::Duration;
use log::debug;
use serde::{Deserialize, Serialize};
use crate::error::{UpdateError, UpdateResult};
use crate::platform::Platform;

/// Latest-release endpoint of the upstream project.
pub const DEFAULT_API_URL: &str = "https://api.github.com/repos/Roblox/luau/releases/latest";
/// Cache root, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".cache";
/// Name of the optional configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "luaupdate.toml";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const USER_AGENT: &str = concat!("luaupdate/", env!("CARGO_PKG_VERSION"));

/// Settings for one run, built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct Config {
    /// URL returning the latest release description.
    pub api_url: String,
    /// Root of the settings record and the artifact cache.
    pub cache_dir: PathBuf,
    /// Explicit installation directory. Skips resolution and PATH registration.
    pub install_dir: Option<PathBuf>,
    /// Platform to select assets for, instead of the detected one.
    pub platform: Option<Platform>,
    /// Bound on each network request.
    pub timeout: Duration,
    /// Reinstall even if the latest version is already installed.
    pub force: bool,
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            install_dir: None,
            platform: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            force: false,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Contents of a `luaupdate.toml` file. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub api_url: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub install_dir: Option<PathBuf>,
    pub platform: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ConfigFile {
    /// Loads a `ConfigFile` from a file path.
    ///
    /// # Errors
    /// Returns a configuration error if the file can't be read or deserialized.
    pub fn load<P: AsRef<Path>>(path: P) -> UpdateResult<ConfigFile> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            UpdateError::Config(format!("could not read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            UpdateError::Config(format!("invalid {}: {e}", path.display()))
        })
    }
}

impl Config {
    /// Overlays the values present in `file` on top of `self`.
    pub fn merge_file(mut self, file: ConfigFile) -> UpdateResult<Self> {
        if let Some(api_url) = file.api_url {
            self.api_url = api_url;
        }
        if let Some(cache_dir) = file.cache_dir {
            self.cache_dir = cache_dir;
        }
        if let Some(install_dir) = file.install_dir {
            self.install_dir = Some(install_dir);
        }
        if let Some(platform) = file.platform {
            self.platform = Some(Platform::from_name(&platform));
        }
        if let Some(secs) = file.timeout_secs {
            self.timeout = timeout_from_secs(secs)?;
        }
        Ok(self)
    }

    /// Reads the explicit config file, or `luaupdate.toml` in the working
    /// directory if it exists, and overlays it on the defaults.
    pub fn load(explicit: Option<&Path>) -> UpdateResult<Self> {
        let config = Config::default();
        match explicit {
            Some(path) => config.merge_file(ConfigFile::load(path)?),
            None => {
                let implicit = Path::new(CONFIG_FILE_NAME);
                if implicit.exists() {
                    debug!("Using configuration from {}", implicit.display());
                    config.merge_file(ConfigFile::load(implicit)?)
                } else {
                    Ok(config)
                }
            }
        }
    }

    /// The platform assets are selected for.
    pub fn platform(&self) -> Platform {
        self.platform.clone().unwrap_or_else(Platform::detect)
    }
}

pub fn timeout_from_secs(secs: u64) -> UpdateResult<Duration> {
    if secs == 0 {
        return Err(UpdateError::Config("timeout must be at least one second".to_string()));
    }
    Ok(Duration::from_secs(secs))
}
