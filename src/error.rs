//! Error kinds for a single update run.
//!
//! Every variant is fatal to the run. The binary maps each one to its own
//! process exit code so scripts can tell "network was down" apart from
//! "the cache directory is not writable".

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Exit code for a run that installed a new version.
pub const EXIT_INSTALLED: u8 = 0;
/// Exit code for a run that found the installed version already current.
pub const EXIT_UP_TO_DATE: u8 = 1;
/// Exit code for invalid command line usage (`EX_USAGE` from `sysexits.h`).
pub const EXIT_USAGE: u8 = 64;

#[derive(Debug, Error)]
pub enum UpdateError {
    /// The release host could not be reached, timed out, or answered with an
    /// error status.
    #[error("network error while fetching {url}: {message}")]
    Network {
        url: String,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The release host answered, but the payload was not a release description.
    #[error("malformed release metadata from {url}: {message}")]
    MalformedMetadata { url: String, message: String },

    /// Reading or writing the cache root failed.
    #[error("cache I/O error at {}: {source}", path.display())]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No prebuilt asset exists for this platform and building from source is
    /// not possible here either.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// The artifact is not a valid archive or the destination is not writable.
    #[error("failed to extract {}: {message}", archive.display())]
    Extraction { archive: PathBuf, message: String },

    /// The source build step failed.
    #[error("build from source failed: {0}")]
    Build(String),

    /// The installation directory could not be created or put on the search path.
    #[error("installation directory {}: {message}", path.display())]
    InstallDir { path: PathBuf, message: String },

    /// Invalid configuration file or flag.
    #[error("configuration error: {0}")]
    Config(String),
}

impl UpdateError {
    pub fn cache_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        UpdateError::CacheIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn extraction(archive: impl AsRef<Path>, message: impl ToString) -> Self {
        UpdateError::Extraction {
            archive: archive.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    pub fn install_dir(path: impl AsRef<Path>, message: impl ToString) -> Self {
        UpdateError::InstallDir {
            path: path.as_ref().to_path_buf(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error kind. `0` and `1` are reserved for the
    /// installed and already-current outcomes.
    pub fn exit_code(&self) -> u8 {
        match self {
            UpdateError::Network { .. } => 2,
            UpdateError::CacheIo { .. } => 3,
            UpdateError::UnsupportedPlatform(_) => 4,
            UpdateError::Extraction { .. } => 5,
            UpdateError::Build(_) => 6,
            UpdateError::InstallDir { .. } => 7,
            UpdateError::Config(_) => 8,
            UpdateError::MalformedMetadata { .. } => 9,
        }
    }
}

pub type UpdateResult<T> = std::result::Result<T, UpdateError>;
