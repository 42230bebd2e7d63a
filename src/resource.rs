//! The data model: a [`Resource`] is one file to be deployed, per `spec.md` §3.

use std::fs::File;
use std::path::PathBuf;

/// Where a resource's bytes come from.
///
/// Modeled as a tagged variant rather than an origin-kind trait hierarchy, per
/// `spec.md` §9 "avoid inheritance hierarchies": the enumerator and the
/// stream-opener both just match on this.
#[derive(Debug, Clone)]
pub enum Origin {
    /// A file already sitting on disk — the development/"unpacked bundle" layout.
    FilePath(PathBuf),
    /// An entry inside an archive. `inner_archive` names the archive-within-archive
    /// when the bundle nests one archive inside another (`spec.md` §4.3); `None`
    /// means `entry_name` is read directly out of the archive at `archive_path`.
    ArchiveEntry {
        archive_path: PathBuf,
        inner_archive: Option<String>,
        entry_name: String,
    },
    /// A remote resource, named by URL. `spec.md` §3 lists this as one of the three
    /// origin kinds in the data model; no bundle kind this crate enumerates produces
    /// it today (network fetch is out of scope per `spec.md` §1), but it's part of
    /// the type so a future bundle kind can add it without reshaping `Resource`.
    StreamUrl(String),
}

/// A signed 31-bit counter: the largest length/decompressed-size this crate will
/// write to a single resource file, per `spec.md` §3.
pub const MAX_RESOURCE_LENGTH: i64 = (1i64 << 30) - 1;

/// Shifts the explicit `[order@N]` tag range below the implicit (enumeration-index)
/// order range, so explicitly ordered resources always sort before implicitly
/// ordered ones (`spec.md` §4.3).
pub const ORDER_TAG_OFFSET: i64 = i32::MIN as i64;

/// One file to be deployed or already deployed.
#[derive(Debug)]
pub struct Resource {
    pub origin: Origin,
    /// Original name inside the bundle, tags already stripped.
    pub display_name: String,
    /// Name written to disk.
    pub output_name: String,
    /// True iff the source name ended in `.zst` (or `_zst`, pre-tag-normalization).
    pub is_compressed: bool,
    /// True iff `output_name` ends in the platform dynamic-library extension.
    pub is_dynamic_library: bool,
    /// Source byte length. Must fit [`MAX_RESOURCE_LENGTH`].
    pub length: i64,
    /// Load-order rank; ascending order loads first (`spec.md` §4.3, §4.5).
    pub order: i64,
    /// A shared read lock held on the deployed file, once deployed/verified.
    pub read_lock: Option<File>,
    /// Flipped true once the Library Loader has successfully loaded this resource.
    pub is_loaded: bool,
}

impl Resource {
    pub fn new(
        origin: Origin,
        display_name: String,
        output_name: String,
        is_compressed: bool,
        length: i64,
        order: i64,
    ) -> Resource {
        let is_dynamic_library = crate::platform::is_dynamic_library_name(&output_name);
        Resource {
            origin,
            display_name,
            output_name,
            is_compressed,
            is_dynamic_library,
            length,
            order,
            read_lock: None,
            is_loaded: false,
        }
    }

    /// Absolute path this resource will be / was written to, within `root`.
    pub fn output_path(&self, root: &std::path::Path) -> PathBuf {
        root.join(&self.output_name)
    }
}

/// Derives a resource's on-disk output name from its tag-stripped display name, per
/// `spec.md` §3: replace `_` with `.`, strip a trailing `.zst`, then splice in the
/// optional dynamic-library suffix before the extension.
pub fn derive_output_name(display_name: &str, dll_suffix: Option<&str>) -> String {
    let mut name = display_name.replace('_', ".");
    if let Some(stripped) = name.strip_suffix(".zst") {
        name = stripped.to_string();
    }
    if let Some(suffix) = dll_suffix {
        if crate::platform::is_dynamic_library_name(&name) {
            if let Some(dot) = name.rfind('.') {
                name = format!("{}{}{}", &name[..dot], suffix, &name[dot..]);
            } else {
                name.push_str(suffix);
            }
        }
    }
    name
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_derive_output_name_basic() {
        assert_eq!(derive_output_name("dummy1_txt_zst", None), "dummy1.txt");
    }

    #[test]
    fn test_derive_output_name_no_compression() {
        assert_eq!(derive_output_name("dummy1_txt", None), "dummy1.txt");
    }

    #[test]
    fn test_derive_output_name_with_suffix() {
        let name = derive_output_name(&format!("libfoo_{}_zst", crate::platform::DLLEXT), Some("_v2"));
        assert_eq!(name, format!("libfoo_v2.{}", crate::platform::DLLEXT));
    }
}
