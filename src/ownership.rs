//! Who the files we create should belong to.
//!
//! When the tool runs under `sudo`, everything it writes into the cache and
//! the installation directory is handed back to the account that invoked
//! `sudo`, so later unprivileged runs can still update it.

use std::io;
use std::path::{Path, PathBuf};
use log::{debug, warn};

/// The non-elevated account on whose behalf the tool runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokingUser {
    /// Login name.
    pub name: String,
    /// Home directory, when it could be determined.
    pub home: Option<PathBuf>,
    /// Numeric owner to assign to created files. Only set when running
    /// elevated on behalf of another account.
    chown_to: Option<(u32, u32)>,
}

impl InvokingUser {
    /// A user that never triggers ownership changes.
    pub fn unprivileged(name: impl Into<String>, home: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            home,
            chown_to: None,
        }
    }

    /// Whether files must be chowned after creation.
    pub fn is_elevated(&self) -> bool {
        self.chown_to.is_some()
    }

    /// Determines the invoking user of this process.
    ///
    /// Under `sudo` this is `SUDO_USER`; otherwise the current account.
    #[cfg(unix)]
    pub fn detect() -> Self {
        use nix::unistd::{geteuid, getuid, User};

        if geteuid().is_root() {
            if let Some(sudo_user) = std::env::var("SUDO_USER").ok().filter(|u| !u.is_empty() && u != "root") {
                match User::from_name(&sudo_user) {
                    Ok(Some(user)) => {
                        debug!("Running elevated on behalf of {}", user.name);
                        return Self {
                            name: user.name,
                            home: Some(user.dir),
                            chown_to: Some((user.uid.as_raw(), user.gid.as_raw())),
                        };
                    }
                    Ok(None) => warn!("SUDO_USER {} does not exist, keeping root ownership", sudo_user),
                    Err(e) => warn!("Could not look up SUDO_USER {}: {}", sudo_user, e),
                }
            }
        }

        let name = std::env::var("USER")
            .ok()
            .or_else(|| User::from_uid(getuid()).ok().flatten().map(|u| u.name))
            .unwrap_or_default();
        Self::unprivileged(name, current_home())
    }

    #[cfg(not(unix))]
    pub fn detect() -> Self {
        let name = std::env::var("USERNAME").unwrap_or_default();
        Self::unprivileged(name, current_home())
    }

    /// Hands `path` over to the invoking user. No-op unless elevated.
    pub fn assign(&self, path: &Path) -> io::Result<()> {
        match self.chown_to {
            Some((uid, gid)) => chown(path, uid, gid),
            None => Ok(()),
        }
    }
}

fn current_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

#[cfg(unix)]
fn chown(path: &Path, uid: u32, gid: u32) -> io::Result<()> {
    use nix::unistd::{Gid, Uid};
    nix::unistd::chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
        .map_err(io::Error::from)
}

#[cfg(not(unix))]
fn chown(_path: &Path, _uid: u32, _gid: u32) -> io::Result<()> {
    Ok(())
}

/// Adds the executable bits for owner, group and others.
#[cfg(unix)]
pub fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Checks if a given path is an executable file on Unix.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Checks if a given path has a Windows executable extension (.exe, .bat, .cmd).
#[cfg(windows)]
pub fn is_executable(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|ext| ext.to_str()) {
        let ext = ext.to_ascii_lowercase();
        matches!(ext.as_str(), "exe" | "bat" | "cmd")
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_unprivileged_user_never_chowns() {
        let dir = tempdir().unwrap();
        let user = InvokingUser::unprivileged("someone", None);
        assert!(!user.is_elevated());
        user.assign(dir.path()).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_make_executable_sets_bits() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("luau");
        std::fs::write(&file, b"#!/bin/sh\n").unwrap();
        assert!(!is_executable(&file));
        make_executable(&file).unwrap();
        assert!(is_executable(&file));
    }

    #[test]
    fn test_detect_finds_a_name_or_home() {
        let user = InvokingUser::detect();
        assert!(!user.name.is_empty() || user.home.is_some());
    }
}
