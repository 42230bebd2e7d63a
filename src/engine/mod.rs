//! Deployment Engine: selects a writable deployment root from a candidate list and
//! runs the per-root verify-or-deploy protocol (`spec.md` §4.4). This is the central
//! state machine everything else in this crate feeds into or consumes from.

mod candidates;
mod deploy;
mod lock;
mod verify;

pub use candidates::build_candidates;

use std::path::PathBuf;

use crate::error::{DeployError, Result};
use crate::resource::Resource;

/// Per-`load` engine configuration, assembled by the builder from its own options.
pub struct EngineOptions<'a> {
    pub always_overwrite: bool,
    pub reuse_partially_deployed: bool,
    pub retry_timeout_ms: Option<u64>,
    pub dll_suffix: Option<&'a str>,
}

/// Tries each of `roots` in order via the per-root protocol; returns the first root
/// that succeeds together with the resource set, every entry now carrying a held read
/// lock. If every root fails, returns the last candidate's error.
pub fn run(
    roots: &[PathBuf],
    mut resources: Vec<Resource>,
    options: &EngineOptions,
) -> Result<(PathBuf, Vec<Resource>)> {
    let total_length: i64 = resources.iter().map(|r| r.length).sum();
    let retry_timeout_ms = options
        .retry_timeout_ms
        .unwrap_or_else(|| (total_length.max(0) as u64) / 4000 + 4000);

    let mut last_error: Option<DeployError> = None;

    for root in roots {
        match try_root(root, &mut resources, options, retry_timeout_ms) {
            Ok(()) => return Ok((root.clone(), resources)),
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "candidate deployment root failed");
                for r in resources.iter_mut() {
                    r.read_lock = None;
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(DeployError::Configuration {
        reason: "no candidate deployment roots were available".to_string(),
    }))
}

/// Steps 1-8 of `spec.md` §4.4 "Per-root protocol" for one candidate root. On
/// success, `resources` all carry held read locks and the directory lock has already
/// been released (dropped at the end of this function, per step 8).
fn try_root(
    root: &PathBuf,
    resources: &mut Vec<Resource>,
    options: &EngineOptions,
    retry_timeout_ms: u64,
) -> Result<()> {
    std::fs::create_dir_all(root).map_err(|e| DeployError::io(root.clone(), e))?;

    if verify::verify_existing(
        root,
        resources,
        retry_timeout_ms,
        options.always_overwrite,
        options.reuse_partially_deployed,
    ) {
        tracing::debug!(root = %root.display(), "reused existing deployment");
        return Ok(());
    }

    let mut directory_lock = lock::acquire_directory_lock(root, retry_timeout_ms)?;
    tracing::debug!(root = %root.display(), "acquired directory lock");

    if verify::verify_existing(
        root,
        resources,
        retry_timeout_ms,
        options.always_overwrite,
        options.reuse_partially_deployed,
    ) {
        let _ = directory_lock.touch();
        tracing::debug!(root = %root.display(), "peer completed deployment while we waited for the lock");
        return Ok(());
    }

    deploy::deploy_files(root, resources, options.dll_suffix, &mut directory_lock)?;
    let _ = directory_lock.touch();
    tracing::info!(root = %root.display(), count = resources.len(), "deployed resources");

    Ok(())
}
