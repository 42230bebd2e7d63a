//! Shared test fixtures: builds a directory-layout bundle with synthetic resource
//! entries, for tests that exercise more than one module at once (`enumerator`,
//! `engine`, `loader`, `builder`) without each hand-rolling the same scaffolding.

use std::path::{Path, PathBuf};
use std::sync::Once;

use tempfile::TempDir;

static TRACING_INIT: Once = Once::new();

/// Installs an `env-filter`-driven `tracing` subscriber for the current test binary,
/// once. This crate never installs a subscriber itself (it's a library — `spec.md`
/// §7/§9 logging is caller-owned), but tests benefit from seeing the `debug!`/`warn!`
/// trail through lock acquisition and the verify/deploy retry loops; set
/// `RUST_LOG=nativedeploy=debug` to see it.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// Zstd-compresses `content`, for building `.zst` fixture entries.
pub fn zst(content: &[u8]) -> Vec<u8> {
    zstd::encode_all(content, 0).unwrap()
}

/// A directory-layout bundle under a temporary directory, built up one resource at a
/// time. Dropped (and its backing directory removed) at the end of the owning test.
pub struct FixtureBundle {
    dir: TempDir,
}

impl FixtureBundle {
    pub fn new() -> FixtureBundle {
        FixtureBundle {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Writes `content` verbatim at `relative_path` within the bundle.
    pub fn add_resource(&self, relative_path: &str, content: &[u8]) -> &Self {
        let full = self.dir.path().join(relative_path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(full, content).unwrap();
        self
    }

    /// Writes a zstd-compressed entry at `relative_path`.
    pub fn add_compressed_resource(&self, relative_path: &str, content: &[u8]) -> &Self {
        self.add_resource(relative_path, &zst(content))
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn location(&self) -> String {
        self.dir.path().to_str().unwrap().to_string()
    }
}

impl Default for FixtureBundle {
    fn default() -> Self {
        FixtureBundle::new()
    }
}

/// Builds the conventional `resources/<OS>/<ARCH>/<name>` relative path for the
/// platform running the test.
pub fn platform_resource_path(name: &str) -> String {
    format!(
        "resources/{}/{}/{}",
        crate::platform::OS,
        crate::platform::ARCH,
        name
    )
}

pub fn fresh_temp_dir() -> PathBuf {
    tempfile::tempdir().unwrap().into_path()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::builder::Deployer;

    #[test]
    fn test_fixture_bundle_round_trips_through_deployer() {
        let bundle = FixtureBundle::new();
        bundle.add_compressed_resource(&platform_resource_path("dummy1.txt.zst"), b"via fixture");

        let dest = fresh_temp_dir().join("out");
        let deployment = Deployer::new()
            .from("resources/$(OS)/$(ARCH)/dummy1.txt.zst")
            .bundle_owner(bundle.location())
            .to(dest.to_str().unwrap())
            .should_load_dlls(false)
            .load()
            .unwrap();

        let path = deployment.resource_path("dummy1.txt").unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"via fixture");
    }
}
