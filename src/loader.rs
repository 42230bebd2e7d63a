//! Library Loader: invokes the platform's dynamic-library primitive over the
//! deployed libraries in load order, iterating to a fixed point to resolve
//! inter-library dependencies without requiring them to be declared (`spec.md` §4.5,
//! §9 "Dynamic-library load ordering").
//!
//! This is the one module allowed `unsafe_code`: [`libloading::Library::new`] is
//! unsafe because loading arbitrary code can run arbitrary initializers. Everything
//! else in this crate keeps the crate-level `#![deny(unsafe_code)]`.

use std::fs::File;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::error::{DeployError, Result};
use crate::resource::Resource;

/// Process-wide pinned read-lock holder list (`spec.md` §3, §4.5 step 5, §5
/// "Process-wide state"): a resource's file handle lands here once its library has
/// loaded and pinning is in effect, so it survives the [`crate::Deployment`] handle
/// being dropped.
static PINNED_HANDLES: Lazy<Mutex<Vec<File>>> = Lazy::new(|| Mutex::new(Vec::new()));

fn pin_handle(file: File) {
    PINNED_HANDLES.lock().unwrap().push(file);
}

/// Returns the number of file handles currently pinned for the life of the process.
/// Exists mainly so tests can observe pinning without exposing the handles
/// themselves.
pub fn pinned_handle_count() -> usize {
    PINNED_HANDLES.lock().unwrap().len()
}

/// Loads every `resources` entry marked `is_dynamic_library`, by ascending `order`,
/// iterating passes until a pass makes no further progress. `keep_handles` is forced
/// by the caller on all non-Windows platforms (`spec.md` §4.5 step 5): when set,
/// loaded libraries' read locks move into [`PINNED_HANDLES`] and every other
/// resource's lock is released; when unset, all locks are simply released by the
/// caller after this returns.
pub fn load_libraries(deployment_root: &std::path::Path, resources: &mut [Resource], keep_handles: bool) -> Result<()> {
    let mut indices: Vec<usize> = resources
        .iter()
        .enumerate()
        .filter(|(_, r)| r.is_dynamic_library)
        .map(|(i, _)| i)
        .collect();
    indices.sort_by_key(|&i| resources[i].order);

    let mut last_error: Option<DeployError> = None;
    loop {
        let mut progressed = false;
        let mut still_pending = Vec::new();

        for &i in &indices {
            if resources[i].is_loaded {
                continue;
            }
            let path = resources[i].output_path(deployment_root);
            match load_one(&path) {
                Ok(()) => {
                    resources[i].is_loaded = true;
                    progressed = true;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "library load attempt failed, will retry");
                    last_error = Some(e);
                    still_pending.push(i);
                }
            }
        }

        indices = still_pending;
        if indices.is_empty() || !progressed {
            break;
        }
    }

    if !indices.is_empty() {
        // the whole operation failed: every is_loaded flag resets, not just the
        // entries still pending, so the reported state stays consistent with load()
        // itself having failed (spec.md §4.4 "Close-down").
        for resource in resources.iter_mut() {
            resource.is_loaded = false;
        }
        return Err(last_error.expect("a pending library implies at least one recorded load error"));
    }

    if keep_handles {
        for resource in resources.iter_mut() {
            if resource.is_dynamic_library {
                if let Some(lock) = resource.read_lock.take() {
                    pin_handle(lock);
                }
            } else {
                resource.read_lock = None;
            }
        }
    }

    Ok(())
}

fn load_one(path: &std::path::Path) -> Result<()> {
    // SAFETY: loading a library deployed by this crate from a path we just wrote
    // ourselves; arbitrary-code-on-load is an inherent property of dynamic linking,
    // not something this call site can make safer.
    #[allow(unsafe_code)]
    let library = unsafe { libloading::Library::new(path) };
    match library {
        Ok(lib) => {
            // leak intentionally: the whole point of loading is that the library's
            // exported symbols remain callable for the life of the process.
            std::mem::forget(lib);
            Ok(())
        }
        Err(source) => Err(DeployError::LibraryLoad {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resource::Origin;

    fn make_non_library_resource(output_name: &str) -> Resource {
        Resource::new(
            Origin::FilePath(std::path::PathBuf::from("unused")),
            output_name.to_string(),
            output_name.to_string(),
            false,
            0,
            0,
        )
    }

    #[test]
    fn test_load_libraries_skips_non_library_resources() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources = vec![make_non_library_resource("data.txt")];
        assert!(load_libraries(dir.path(), &mut resources, false).is_ok());
        assert!(!resources[0].is_loaded);
    }

    #[test]
    fn test_load_libraries_fails_for_missing_library_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources = vec![Resource::new(
            Origin::FilePath(std::path::PathBuf::from("unused")),
            format!("missing_{}", crate::platform::DLLEXT),
            format!("missing.{}", crate::platform::DLLEXT),
            false,
            0,
            0,
        )];
        let err = load_libraries(dir.path(), &mut resources, false).unwrap_err();
        assert!(matches!(err, DeployError::LibraryLoad { .. }));
        assert!(!resources[0].is_loaded);
    }
}
