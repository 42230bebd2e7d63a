use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeployError>;

/// The error taxonomy surfaced by [`crate::Deployer::load`].
///
/// Janitor operations (`try_create_lock_file`, `try_delete_directory`, the cleanup
/// sweep) never raise: they report success as a plain `bool`/`Option`, matching the
/// contract used by every cooperating process. `DeployError` is only for the one
/// `load()` entry point and the template expander, which both fail eagerly and
/// synchronously.
#[derive(Error, Debug)]
pub enum DeployError {
    /// An unresolved or malformed `$(NAME)` placeholder, or a malformed `[key@value]`
    /// tag, in a resource or deployment path template.
    #[error("template syntax error in {template:?}: {reason}")]
    TemplateSyntax { template: String, reason: String },

    /// Zero entries matched the (expanded) source template.
    #[error("no resources matched {template:?}")]
    ResourceNotFound { template: String },

    /// A matched resource's length doesn't fit the signed 31-bit counter, or its
    /// decompressed size doesn't either.
    #[error("resource {name:?} is invalid: {reason}")]
    ResourceInvalid { name: String, reason: String },

    /// A read, write, create, or decompress failure while deploying.
    #[error("I/O error deploying {path:?}: {source}")]
    DeployIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The directory lock could not be acquired within `retry_timeout_ms`, and the
    /// lock's mtime is within the liveness window: a peer is still holding it.
    #[error("deployment directory {path:?} is locked by a live peer (lock age {age:?})")]
    DeployLocked { path: PathBuf, age: Duration },

    /// The platform library-loading primitive failed for at least one library after
    /// the fixed-point iteration settled.
    #[error("failed to load library {path:?}: {source}")]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },

    /// Incompatible builder options, e.g. `always_overwrite` with
    /// `reuse_partially_deployed`.
    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },
}

impl DeployError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::DeployIo {
            path: path.into(),
            source,
        }
    }
}
