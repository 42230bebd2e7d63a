//! Directory-lock acquisition with stale-lock handling, per `spec.md` §4.4
//! "Stale-lock handling".

use std::path::Path;
use std::time::{Duration, Instant, SystemTime};

use crate::error::{DeployError, Result};
use crate::janitor::{lock_file_mtime, DirectoryLock};

const ATTEMPTS_PER_ROUND: u32 = 3;

/// Acquires `root`'s directory lock. Tries three attempts per round, spaced by
/// whatever's left of `retry_timeout_ms`. If all three fail, inspects the lock
/// file's last-modified time: if it still falls inside the liveness window, the
/// attempt counter resets for another round; once it falls outside, the lock is
/// treated as orphaned and this fails with [`DeployError::DeployLocked`].
pub fn acquire_directory_lock(root: &Path, retry_timeout_ms: u64) -> Result<DirectoryLock> {
    let retry_timeout = Duration::from_millis(retry_timeout_ms.max(1));

    loop {
        let round_start = Instant::now();
        let mut acquired = None;
        for attempt in 0..ATTEMPTS_PER_ROUND {
            if let Some(lock) = DirectoryLock::try_create(root) {
                acquired = Some(lock);
                break;
            }
            if attempt + 1 == ATTEMPTS_PER_ROUND {
                break;
            }
            let remaining = retry_timeout.saturating_sub(round_start.elapsed());
            std::thread::sleep(random_sleep(remaining));
        }
        if let Some(lock) = acquired {
            return Ok(lock);
        }

        let Some(mtime) = lock_file_mtime(root) else {
            // the lock file vanished between our last failed attempt and now.
            continue;
        };

        if mtime_is_live(mtime, retry_timeout_ms) {
            tracing::warn!(root = %root.display(), "directory lock held by a live peer, retrying");
            continue;
        }

        return Err(DeployError::DeployLocked {
            path: root.to_path_buf(),
            age: lock_age(mtime),
        });
    }
}

fn random_sleep(cap: Duration) -> Duration {
    let cap_ms = cap.as_millis().max(1) as u64;
    Duration::from_millis(fastrand::u64(1..=cap_ms))
}

/// The liveness window is `[now - retry_timeout_ms, now + 10*retry_timeout_ms]` — the
/// forward side is ten times wider, to tolerate clock skew between the holder and the
/// process probing it (`spec.md` §9, preserved as specified rather than symmetric).
fn mtime_is_live(mtime: SystemTime, retry_timeout_ms: u64) -> bool {
    let now = SystemTime::now();
    let lower_bound = now.checked_sub(Duration::from_millis(retry_timeout_ms));
    let upper_bound = now.checked_add(Duration::from_millis(10 * retry_timeout_ms));
    match (lower_bound, upper_bound) {
        (Some(lower), Some(upper)) => mtime >= lower && mtime <= upper,
        _ => true,
    }
}

fn lock_age(mtime: SystemTime) -> Duration {
    SystemTime::now()
        .duration_since(mtime)
        .unwrap_or(Duration::ZERO)
}
