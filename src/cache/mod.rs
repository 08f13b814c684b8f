//! The on-disk cache: the settings record and downloaded artifacts.
//!
//! Layout under the cache root:
//!
//! ```text
//! .cache/
//!   .settings.json            {"version": "<tag>"} or {}
//!   .lock                     locked while a run is in progress
//!   <tag>/<asset>             downloaded artifact
//!   <tag>/<asset>.sha256      digest recorded when the artifact was stored
//! ```
//!
//! Nothing outside this module reads or writes these files directly.

mod lock;
mod settings;

pub use lock::CacheLock;
pub use settings::CacheSettings;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use crate::error::{UpdateError, UpdateResult};
use crate::ownership::{make_executable, InvokingUser};

pub const SETTINGS_FILE_NAME: &str = ".settings.json";
pub const LOCK_FILE_NAME: &str = ".lock";
pub const DIGEST_EXTENSION: &str = "sha256";

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    owner: InvokingUser,
}

impl CacheStore {
    /// Opens the cache rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>, owner: InvokingUser) -> UpdateResult<Self> {
        let store = Self {
            root: root.into(),
            owner,
        };
        store.ensure_dir(&store.root)?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE_NAME)
    }

    /// Takes the cross-process lock for this cache root.
    pub fn lock(&self) -> UpdateResult<CacheLock> {
        let path = self.root.join(LOCK_FILE_NAME);
        let lock = CacheLock::acquire(&path)?;
        self.owner
            .assign(&path)
            .map_err(|e| UpdateError::cache_io(&path, e))?;
        Ok(lock)
    }

    /// Reads the settings record, writing an empty one on first use.
    ///
    /// A record that exists but does not parse is reported and treated as
    /// empty; the next successful install replaces it.
    pub fn read_settings(&self) -> UpdateResult<CacheSettings> {
        self.ensure_dir(&self.root)?;
        let path = self.settings_path();
        if !path.exists() {
            debug!("Initializing {}", path.display());
            let settings = CacheSettings::default();
            self.write_settings(&settings)?;
            return Ok(settings);
        }
        let content = fs::read_to_string(&path).map_err(|e| UpdateError::cache_io(&path, e))?;
        match serde_json::from_str(&content) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                warn!("Ignoring unreadable settings in {}: {}", path.display(), e);
                Ok(CacheSettings::default())
            }
        }
    }

    /// Atomically replaces the settings record.
    pub fn write_settings(&self, settings: &CacheSettings) -> UpdateResult<()> {
        let path = self.settings_path();
        let json = serde_json::to_vec_pretty(settings)
            .map_err(|e| UpdateError::cache_io(&path, e.into()))?;
        self.write_atomic(&path, &json)?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    /// Canonical location of an artifact. Pure path computation.
    pub fn artifact_path(&self, version: &str, file_name: &str) -> PathBuf {
        self.root.join(version).join(file_name)
    }

    fn digest_path(&self, version: &str, file_name: &str) -> PathBuf {
        self.root
            .join(version)
            .join(format!("{file_name}.{DIGEST_EXTENSION}"))
    }

    pub fn has_artifact(&self, version: &str, file_name: &str) -> bool {
        self.artifact_path(version, file_name).is_file()
    }

    /// Checks a cached artifact against the digest recorded when it was stored.
    ///
    /// Artifacts without a recorded digest are trusted.
    pub fn verify_artifact(&self, version: &str, file_name: &str) -> bool {
        let digest_path = self.digest_path(version, file_name);
        let Ok(expected) = fs::read_to_string(&digest_path) else {
            return true;
        };
        let artifact = self.artifact_path(version, file_name);
        match fs::read(&artifact) {
            Ok(bytes) => {
                let matches = sha256_hex(&bytes) == expected.trim().to_ascii_lowercase();
                if !matches {
                    warn!("Cached artifact {} does not match its recorded digest", artifact.display());
                }
                matches
            }
            Err(e) => {
                warn!("Could not read cached artifact {}: {}", artifact.display(), e);
                false
            }
        }
    }

    /// Stores downloaded bytes at the canonical artifact path.
    ///
    /// The digest sidecar is written first and the artifact is renamed into
    /// place last, so the canonical path only ever holds a complete file.
    pub fn store_artifact(
        &self,
        version: &str,
        file_name: &str,
        bytes: &[u8],
        executable: bool,
    ) -> UpdateResult<PathBuf> {
        let dir = self.root.join(version);
        self.ensure_dir(&dir)?;

        let digest_path = self.digest_path(version, file_name);
        self.write_atomic(&digest_path, format!("{}\n", sha256_hex(bytes)).as_bytes())?;

        let path = self.artifact_path(version, file_name);
        self.write_atomic(&path, bytes)?;
        if executable {
            make_executable(&path).map_err(|e| UpdateError::cache_io(&path, e))?;
        }
        info!("Cached {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    fn ensure_dir(&self, dir: &Path) -> UpdateResult<()> {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| UpdateError::cache_io(dir, e))?;
        }
        self.owner
            .assign(dir)
            .map_err(|e| UpdateError::cache_io(dir, e))
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> UpdateResult<()> {
        let dir = path.parent().unwrap_or(self.root.as_path());
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| UpdateError::cache_io(dir, e))?;
        tmp.write_all(bytes)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| UpdateError::cache_io(tmp.path(), e))?;
        tmp.persist(path)
            .map_err(|e| UpdateError::cache_io(path, e.error))?;
        self.owner
            .assign(path)
            .map_err(|e| UpdateError::cache_io(path, e))
    }
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
