//! Safe directory teardown, per `spec.md` §4.2 "Safe directory delete".

use std::path::{Path, PathBuf};

use fs2::FileExt;

use super::lockfile::{DirectoryLock, LOCK_FILE_NAME};

/// Attempts to delete `dir` and everything in it, refusing if any non-lock-file
/// child is held open (exclusively lockable) by a peer process. Returns `false`
/// without deleting anything in that case, and `false` (but possibly having deleted
/// some children) if a delete itself fails partway through.
pub fn try_delete_directory(dir: &Path) -> bool {
    let Some(lock) = DirectoryLock::try_create(dir) else {
        return false;
    };

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return false,
    };

    let mut children: Vec<PathBuf> = Vec::new();
    let mut opened: Vec<std::fs::File> = Vec::new();
    for entry in entries {
        let Ok(entry) = entry else { return false };
        if entry.file_name() == LOCK_FILE_NAME {
            continue;
        }
        let file_type = match entry.file_type() {
            Ok(t) => t,
            Err(_) => return false,
        };
        let path = entry.path();
        if file_type.is_file() {
            let opened_file = match std::fs::OpenOptions::new().write(true).open(&path) {
                Ok(f) => f,
                Err(_) => return false,
            };
            if opened_file.try_lock_exclusive().is_err() {
                return false;
            }
            opened.push(opened_file);
        }
        children.push(path);
    }

    for f in opened.drain(..) {
        let _ = FileExt::unlock(&f);
    }

    for child in &children {
        let is_dir = std::fs::symlink_metadata(child)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        let result = if is_dir {
            std::fs::remove_dir(child)
        } else {
            std::fs::remove_file(child)
        };
        if result.is_err() {
            return false;
        }
    }

    drop(lock);
    std::fs::remove_dir(dir).is_ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use fs2::FileExt as _;

    #[test]
    fn test_delete_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.into_path();
        assert!(try_delete_directory(&path));
        assert!(!path.exists());
    }

    #[test]
    fn test_delete_with_plain_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"y").unwrap();
        let path = dir.path().to_path_buf();
        assert!(try_delete_directory(dir.path()));
        assert!(!path.exists());
    }

    #[test]
    fn test_s6_safe_delete_refusal() {
        let dir = tempfile::tempdir().unwrap();
        let in_use = dir.path().join("in_use");
        std::fs::write(&in_use, b"locked").unwrap();
        let held = std::fs::OpenOptions::new().write(true).open(&in_use).unwrap();
        held.lock_exclusive().unwrap();

        assert!(!try_delete_directory(dir.path()));
        assert!(in_use.exists());

        FileExt::unlock(&held).unwrap();
    }
}
