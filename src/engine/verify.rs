//! `verify_existing`, per `spec.md` §4.4.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::janitor::{lock_file_exists, try_lock_shared};
use crate::resource::Resource;

/// True iff every resource in `resources` is already present in `root` and a shared
/// read lock was acquired on each. Mutates `resources[i].read_lock` along the way;
/// on a `false` return with `reuse_partially_deployed` unset, every lock taken during
/// this call is released again before returning.
pub fn verify_existing(
    root: &Path,
    resources: &mut [Resource],
    retry_timeout_ms: u64,
    always_overwrite: bool,
    reuse_partially_deployed: bool,
) -> bool {
    if always_overwrite {
        return false;
    }

    let expected = resources.len();
    let deadline = Instant::now() + Duration::from_millis(retry_timeout_ms);

    loop {
        let (found, opened) = probe(root, resources);

        if found == 0 {
            return false;
        }
        if opened == expected {
            return true;
        }
        if opened == found {
            bail(resources, reuse_partially_deployed);
            return false;
        }
        if lock_file_exists(root) {
            bail(resources, reuse_partially_deployed);
            return false;
        }
        if Instant::now() >= deadline {
            bail(resources, reuse_partially_deployed);
            return false;
        }

        std::thread::sleep(Duration::from_millis(fastrand::u64(16..=47)));
        if !reuse_partially_deployed {
            clear_locks(resources);
        }
    }
}

fn probe(root: &Path, resources: &mut [Resource]) -> (usize, usize) {
    let mut found = 0usize;
    let mut opened = 0usize;
    for resource in resources.iter_mut() {
        if resource.read_lock.is_some() {
            found += 1;
            opened += 1;
            continue;
        }
        let path = resource.output_path(root);
        if path.is_file() {
            found += 1;
            if let Some(lock) = try_lock_shared(&path) {
                resource.read_lock = Some(lock);
                opened += 1;
            }
        }
    }
    (found, opened)
}

fn bail(resources: &mut [Resource], reuse_partially_deployed: bool) {
    if !reuse_partially_deployed {
        clear_locks(resources);
    }
}

fn clear_locks(resources: &mut [Resource]) {
    for r in resources.iter_mut() {
        r.read_lock = None;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resource::Origin;

    fn make_resource(output_name: &str) -> Resource {
        Resource::new(
            Origin::FilePath(std::path::PathBuf::from("unused")),
            output_name.to_string(),
            output_name.to_string(),
            false,
            2,
            0,
        )
    }

    #[test]
    fn test_all_present_returns_true() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let mut resources = vec![make_resource("a.txt")];
        assert!(verify_existing(dir.path(), &mut resources, 1000, false, false));
        assert!(resources[0].read_lock.is_some());
    }

    #[test]
    fn test_always_overwrite_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let mut resources = vec![make_resource("a.txt")];
        assert!(!verify_existing(dir.path(), &mut resources, 1000, true, false));
        assert!(resources[0].read_lock.is_none());
    }

    #[test]
    fn test_missing_file_returns_false_promptly() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources = vec![make_resource("a.txt")];
        assert!(!verify_existing(dir.path(), &mut resources, 40, false, false));
    }

    #[test]
    fn test_partial_match_without_reuse_releases_locks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        let mut resources = vec![make_resource("a.txt"), make_resource("b.txt")];
        assert!(!verify_existing(dir.path(), &mut resources, 40, false, false));
        assert!(resources[0].read_lock.is_none());
    }
}
