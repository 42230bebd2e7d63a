//! File Janitor: the lock-file primitive, safe directory teardown, and the
//! process-exit cleanup registry (`spec.md` §4.2). Used both by the deployment
//! engine and by callers who register their own paths for on-exit cleanup.
//!
//! Janitor operations never raise — they report success as `bool`/`Option`, per
//! `spec.md` §7.

mod cleanup;
mod delete;
mod lockfile;

pub use cleanup::{
    is_fallback_root_name, register_for_cleanup, register_for_cleanup_on_exit, sweep,
    CleanupEntry,
};
pub use delete::try_delete_directory;
pub use lockfile::{
    lock_file_exists, lock_file_mtime, try_lock_shared, DirectoryLock, BEACON_PERIOD,
    LOCK_FILE_NAME,
};
