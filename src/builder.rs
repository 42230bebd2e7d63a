//! The public interface: a fluent [`Deployer`] builder and the [`Deployment`] handle
//! it produces, per `spec.md` §6 "External interfaces".

use std::path::{Path, PathBuf};

use crate::bundle::Bundle;
use crate::engine::{self, EngineOptions};
use crate::enumerator;
use crate::error::{DeployError, Result};
use crate::loader;
use crate::resource::Resource;
use crate::template;

/// Fluent builder for one deployment. Construction order between `from`/`to` doesn't
/// matter; `load()` validates everything and runs the deployment.
#[derive(Default)]
pub struct Deployer {
    resource_template: Option<String>,
    bundle_location: Option<String>,
    destination_template: Option<String>,
    version: Option<String>,
    always_overwrite: bool,
    reuse_partially_deployed: bool,
    should_load_dlls: Option<bool>,
    try_random_fallback_subdirectory: bool,
    dll_suffix: Option<String>,
    retry_timeout_ms: Option<u64>,
}

impl Deployer {
    pub fn new() -> Deployer {
        Deployer::default()
    }

    /// The resource source template, e.g. `"resources/$(OS)/$(ARCH)/*"`. Mandatory.
    pub fn from(mut self, resource_path_template: impl Into<String>) -> Deployer {
        self.resource_template = Some(resource_path_template.into());
        self
    }

    /// The bundle a resource template is resolved against: a directory or archive
    /// path, optionally addressing a nested archive via [`crate::bundle::ARCHIVE_MARKER`].
    /// Defaults to `"."` (the current directory) when never called.
    pub fn bundle_owner(mut self, bundle_location: impl Into<String>) -> Deployer {
        self.bundle_location = Some(bundle_location.into());
        self
    }

    /// The deployment destination template, e.g. `"/opt/myapp/$(VERSION)"`. Mandatory.
    pub fn to(mut self, deployment_path_template: impl Into<String>) -> Deployer {
        self.destination_template = Some(deployment_path_template.into());
        self
    }

    /// The `$(VERSION)` substitution value. Defaults to `"0"`, matching `spec.md`
    /// §4.1's documented default for an absent package/assembly version.
    pub fn version(mut self, version: impl Into<String>) -> Deployer {
        self.version = Some(version.into());
        self
    }

    pub fn always_overwrite(mut self, value: bool) -> Deployer {
        self.always_overwrite = value;
        self
    }

    pub fn reuse_partially_deployed(mut self, value: bool) -> Deployer {
        self.reuse_partially_deployed = value;
        self
    }

    pub fn should_load_dlls(mut self, value: bool) -> Deployer {
        self.should_load_dlls = Some(value);
        self
    }

    pub fn try_random_fallback_subdirectory(mut self, value: bool) -> Deployer {
        self.try_random_fallback_subdirectory = value;
        self
    }

    /// Must be non-empty; `load()` rejects an empty suffix with
    /// `DeployError::Configuration` (`spec.md` §6).
    pub fn add_dll_suffix(mut self, suffix: impl Into<String>) -> Deployer {
        self.dll_suffix = Some(suffix.into());
        self
    }

    pub fn retry_timeout(mut self, milliseconds: u64) -> Deployer {
        self.retry_timeout_ms = Some(milliseconds);
        self
    }

    /// Runs the deployment: expands templates, enumerates resources, selects a
    /// candidate root, verifies or writes, and (by default) loads the resulting
    /// dynamic libraries. Returns a [`Deployment`] handle on success.
    pub fn load(self) -> Result<Deployment> {
        if self.always_overwrite && self.reuse_partially_deployed {
            return Err(DeployError::Configuration {
                reason: "always_overwrite and reuse_partially_deployed are incompatible"
                    .to_string(),
            });
        }
        if matches!(&self.dll_suffix, Some(suffix) if suffix.is_empty()) {
            return Err(DeployError::Configuration {
                reason: "add_dll_suffix requires a non-empty suffix".to_string(),
            });
        }

        let resource_template = self.resource_template.ok_or_else(|| DeployError::Configuration {
            reason: "from(...) is mandatory".to_string(),
        })?;
        let destination_template = self
            .destination_template
            .ok_or_else(|| DeployError::Configuration {
                reason: "to(...) is mandatory".to_string(),
            })?;
        let version = self.version.unwrap_or_else(|| "0".to_string());
        let should_load_dlls = self.should_load_dlls.unwrap_or(true);
        let bundle_location = self.bundle_location.unwrap_or_else(|| ".".to_string());

        let expanded_source = template::expand_source(&resource_template, &version)?;
        let expanded_destination = template::expand_destination(&destination_template, &version)?;

        let mut bundle = Bundle::open(&bundle_location)?;
        let resource_path = bundle.location_path().to_path_buf();
        let resources = enumerator::enumerate(&mut bundle, &expanded_source, self.dll_suffix.as_deref())?;
        drop(bundle);

        let roots = engine::build_candidates(
            &expanded_destination,
            self.try_random_fallback_subdirectory,
        );

        let engine_options = EngineOptions {
            always_overwrite: self.always_overwrite,
            reuse_partially_deployed: self.reuse_partially_deployed,
            retry_timeout_ms: self.retry_timeout_ms,
            dll_suffix: self.dll_suffix.as_deref(),
        };
        let (deployment_path, mut resources) = engine::run(&roots, resources, &engine_options)?;

        if should_load_dlls {
            let keep_handles = !cfg!(windows);
            loader::load_libraries(&deployment_path, &mut resources, keep_handles)?;
            if !keep_handles {
                release_all_locks(&mut resources);
            }
        } else {
            release_all_locks(&mut resources);
        }

        Ok(Deployment {
            actual_deployment_path: deployment_path,
            actual_resource_path: resource_path,
            resources,
        })
    }
}

fn release_all_locks(resources: &mut [Resource]) {
    for resource in resources.iter_mut() {
        resource.read_lock = None;
    }
}

/// The result of a completed [`Deployer::load`].
pub struct Deployment {
    actual_deployment_path: PathBuf,
    actual_resource_path: PathBuf,
    resources: Vec<Resource>,
}

impl Deployment {
    /// The candidate root that was actually selected and written to (or reused).
    pub fn actual_deployment_path(&self) -> &Path {
        &self.actual_deployment_path
    }

    /// The bundle location resources were actually read from.
    pub fn actual_resource_path(&self) -> &Path {
        &self.actual_resource_path
    }

    /// Every resource that was deployed (and, if requested, loaded).
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Absolute path of one deployed resource by its on-disk output name.
    pub fn resource_path(&self, output_name: &str) -> Option<PathBuf> {
        self.resources
            .iter()
            .find(|r| r.output_name == output_name)
            .map(|r| r.output_path(&self.actual_deployment_path))
    }
}
