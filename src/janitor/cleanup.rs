//! Process-exit cleanup registry, per `spec.md` §3 "CleanupEntry" and §4.2
//! "Cleanup registry".

use std::path::PathBuf;
use std::sync::{Mutex, Once};

use once_cell::sync::Lazy;
use regex::Regex;

use super::delete::try_delete_directory;
use crate::template::looks_like_random_token;

/// `(path, clean_self_flag, subdirectory_pattern)`, owned process-wide.
pub struct CleanupEntry {
    pub path: PathBuf,
    pub clean_self: bool,
    pub subdirectory_pattern: Option<Regex>,
}

impl CleanupEntry {
    /// The pattern the engine registers for its own `$(RANDOM)`-suffixed fallback
    /// roots (`spec.md` §6 "Persisted layout"): `^[0-9a-fA-F]{4,8}$`.
    pub fn random_subdirectories(path: PathBuf, clean_self: bool) -> CleanupEntry {
        CleanupEntry {
            path,
            clean_self,
            subdirectory_pattern: Some(Regex::new(r"^[0-9a-fA-F]{4,8}$").unwrap()),
        }
    }
}

static REGISTRY: Lazy<Mutex<Vec<CleanupEntry>>> = Lazy::new(|| Mutex::new(Vec::new()));
static HOOK_INSTALLED: Once = Once::new();

/// Appends `entry` to the process-wide cleanup registry and ensures the process-exit
/// sweep hook is installed (idempotent: [`register_for_cleanup_on_exit`] only installs
/// it once per process).
pub fn register_for_cleanup(entry: CleanupEntry) {
    REGISTRY.lock().unwrap().push(entry);
    register_for_cleanup_on_exit();
}

/// Installs, at most once per process, an exit hook that sweeps the registry.
pub fn register_for_cleanup_on_exit() {
    HOOK_INSTALLED.call_once(|| {
        // SAFETY: `run_cleanup_on_exit` is a valid `extern "C" fn()`, registered at
        // most once (guarded by `HOOK_INSTALLED`), and performs no FFI calls that
        // aren't themselves safe Rust under the hood.
        #[allow(unsafe_code)]
        unsafe {
            libc::atexit(run_cleanup_on_exit);
        }
    });
}

extern "C" fn run_cleanup_on_exit() {
    sweep();
}

/// Runs one sweep of the registry: for every entry with a subdirectory pattern,
/// tries [`try_delete_directory`] on every immediate subdirectory whose basename
/// matches; if `clean_self` is set, also tries it on the entry's own path. Entries
/// that are fully cleaned are removed from the registry.
pub fn sweep() {
    let mut registry = REGISTRY.lock().unwrap();
    registry.retain(|entry| !clean_entry(entry));
}

fn clean_entry(entry: &CleanupEntry) -> bool {
    let mut fully_cleaned = true;

    if let Some(pattern) = &entry.subdirectory_pattern {
        if let Ok(children) = std::fs::read_dir(&entry.path) {
            for child in children.flatten() {
                let name = child.file_name();
                let Some(name) = name.to_str() else { continue };
                if !pattern.is_match(name) {
                    continue;
                }
                if !try_delete_directory(&child.path()) {
                    fully_cleaned = false;
                }
            }
        }
    }

    if entry.clean_self {
        if !try_delete_directory(&entry.path) {
            fully_cleaned = false;
        }
    }

    fully_cleaned
}

/// True iff `name` matches the fallback-root subdirectory pattern used across this
/// crate (kept as a standalone helper so non-cleanup code, e.g. tests, can reuse the
/// same grammar without constructing a [`CleanupEntry`]).
pub fn is_fallback_root_name(name: &str) -> bool {
    looks_like_random_token(name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sweep_cleans_matching_subdirectories() {
        let base = tempfile::tempdir().unwrap();
        std::fs::create_dir(base.path().join("deadbeef")).unwrap();
        std::fs::create_dir(base.path().join("not-a-token")).unwrap();

        register_for_cleanup(CleanupEntry::random_subdirectories(
            base.path().to_path_buf(),
            false,
        ));
        sweep();

        assert!(!base.path().join("deadbeef").exists());
        assert!(base.path().join("not-a-token").exists());
    }

    #[test]
    fn test_sweep_cleans_self_when_requested() {
        let base = tempfile::tempdir().unwrap();
        let sub = base.path().join("to-clean");
        std::fs::create_dir(&sub).unwrap();

        register_for_cleanup(CleanupEntry {
            path: sub.clone(),
            clean_self: true,
            subdirectory_pattern: None,
        });
        sweep();

        assert!(!sub.exists());
    }
}
