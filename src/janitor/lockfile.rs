//! The lock primitive: `lockfile.$$$` in a deployment root, per `spec.md` §4.2.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fs2::FileExt;

/// Basename of the sentinel lock file within a deployment root.
pub const LOCK_FILE_NAME: &str = "lockfile.$$$";

/// Liveness beacon period: holders of the lock rewrite byte zero and flush on this
/// cadence so peers can distinguish a live holder from an orphaned lock.
pub const BEACON_PERIOD: std::time::Duration = std::time::Duration::from_secs(2);

pub fn lock_file_path(dir: &Path) -> PathBuf {
    dir.join(LOCK_FILE_NAME)
}

/// A held directory lock. Releasing (dropping) the handle closes the file and
/// attempts to delete it. The lock is advisory only: it does not stop
/// non-cooperating code from touching the directory.
pub struct DirectoryLock {
    file: File,
    path: PathBuf,
}

impl DirectoryLock {
    /// Attempts to open-or-create `dir/lockfile.$$$` and take a non-blocking
    /// exclusive advisory lock on it. Returns `None` on any failure: lock held by a
    /// peer, permission denied, or any other I/O error.
    pub fn try_create(dir: &Path) -> Option<DirectoryLock> {
        let path = lock_file_path(dir);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .ok()?;
        match file.try_lock_exclusive() {
            Ok(()) => Some(DirectoryLock { file, path }),
            Err(_) => None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites byte zero and flushes: the liveness beacon.
    pub fn touch(&mut self) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&[0u8])?;
        self.file.flush()?;
        self.file.sync_data()
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Reads the lock file's last-modified time without taking the lock — used by the
/// stale-lock check, which must be able to inspect a lock it couldn't acquire.
pub fn lock_file_mtime(dir: &Path) -> Option<SystemTime> {
    std::fs::metadata(lock_file_path(dir)).ok()?.modified().ok()
}

pub fn lock_file_exists(dir: &Path) -> bool {
    lock_file_path(dir).is_file()
}

/// Acquires a shared (read) advisory lock on `path`, if the file exists and isn't
/// exclusively locked by a peer. Used both to "pin" deployed resource files and to
/// probe whether a file is free to read during `verify_existing`.
pub fn try_lock_shared(path: &Path) -> Option<File> {
    let file = OpenOptions::new().read(true).open(path).ok()?;
    match file.try_lock_shared() {
        Ok(()) => Some(file),
        Err(_) => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_s5_lock_contention() {
        let dir = tempfile::tempdir().unwrap();
        let _held = DirectoryLock::try_create(dir.path()).unwrap();
        assert!(DirectoryLock::try_create(dir.path()).is_none());
    }

    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        {
            let _held = DirectoryLock::try_create(dir.path()).unwrap();
        }
        assert!(!lock_file_exists(dir.path()));
        assert!(DirectoryLock::try_create(dir.path()).is_some());
    }

    #[test]
    fn test_touch_updates_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = DirectoryLock::try_create(dir.path()).unwrap();
        lock.touch().unwrap();
        assert!(lock_file_mtime(dir.path()).is_some());
    }

    #[test]
    fn test_beacon_period_is_two_seconds() {
        assert_eq!(BEACON_PERIOD, std::time::Duration::from_secs(2));
    }
}
