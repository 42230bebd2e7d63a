//! Deploys embedded native resources from an application bundle onto the local
//! filesystem, safely under concurrent invocation by multiple processes, and
//! (optionally) loads the resulting dynamic libraries into the current process.
//!
//! Five cooperating pieces, leaves first: the template expander (`template`), the
//! file janitor (`janitor`), the resource enumerator (`enumerator`/`bundle`), the
//! deployment engine (`engine`), and the library loader (`loader`). [`Deployer`] is
//! the single external entry point tying them together.

#![deny(unsafe_code)]

mod bundle;
mod builder;
mod engine;
mod enumerator;
mod error;
mod janitor;
mod loader;
mod platform;
mod resource;
mod tags;
mod template;

pub use builder::{Deployer, Deployment};
pub use error::{DeployError, Result};
pub use resource::Resource;

#[cfg(test)]
mod test_util;
