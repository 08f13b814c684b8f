use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use log::debug;
use crate::error::{UpdateError, UpdateResult};

#[cfg(unix)]
type LockedFile = nix::fcntl::Flock<File>;
#[cfg(not(unix))]
type LockedFile = File;

/// Advisory lock over the whole cache root, held for the duration of a run.
///
/// The lock is an exclusive OS lock on `<cache>/.lock`. The file itself stays
/// on disk; the lock goes away when the guard is dropped or the process
/// exits, however it exits.
pub struct CacheLock {
    path: PathBuf,
    _file: LockedFile,
}

impl CacheLock {
    /// Takes the lock without waiting.
    ///
    /// # Errors
    /// A lock held by another run is a [`UpdateError::CacheIo`] with
    /// [`ErrorKind::WouldBlock`].
    pub fn acquire(path: &Path) -> UpdateResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| UpdateError::cache_io(path, e))?;

        let mut file = lock_exclusive(file).map_err(|e| {
            if e.kind() == ErrorKind::WouldBlock {
                UpdateError::cache_io(
                    path,
                    io::Error::new(ErrorKind::WouldBlock, "another luaupdate run holds the cache lock"),
                )
            } else {
                UpdateError::cache_io(path, e)
            }
        })?;

        if let Err(e) = file.set_len(0).and_then(|()| writeln!(file, "{}", std::process::id())) {
            debug!("Could not record pid in {}: {}", path.display(), e);
        }
        debug!("Acquired cache lock {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for CacheLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheLock").field("path", &self.path).finish()
    }
}

#[cfg(unix)]
fn lock_exclusive(file: File) -> io::Result<LockedFile> {
    use nix::fcntl::{Flock, FlockArg};
    Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_, errno)| io::Error::from(errno))
}

#[cfg(not(unix))]
fn lock_exclusive(file: File) -> io::Result<LockedFile> {
    use std::fs::TryLockError;
    file.try_lock().map_err(|e| match e {
        TryLockError::WouldBlock => io::Error::from(ErrorKind::WouldBlock),
        TryLockError::Error(e) => e,
    })?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_fails_until_release() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".lock");

        let first = CacheLock::acquire(&path).unwrap();
        let err = CacheLock::acquire(&path).unwrap_err();
        match err {
            UpdateError::CacheIo { source, .. } => assert_eq!(source.kind(), ErrorKind::WouldBlock),
            other => panic!("unexpected error {other:?}"),
        }

        drop(first);
        assert!(path.exists());
        let _again = CacheLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_lock_file_left_by_killed_run_does_not_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".lock");
        std::fs::write(&path, "4242\n").unwrap();

        let lock = CacheLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path);
        let pid = std::fs::read_to_string(&path).unwrap();
        assert_eq!(pid.trim(), std::process::id().to_string());
    }
}
