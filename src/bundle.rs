//! Bundle access: the application package resources are enumerated from, per
//! `spec.md` §4.3 / GLOSSARY. Three shapes are supported, matching the spec's three
//! origin kinds:
//!
//! - a plain directory on disk (development layout)
//! - a single zip archive
//! - an archive nested inside another archive, addressed by a bundle location
//!   string containing the archive marker (`!/`) twice
//!
//! Avoids an origin-kind trait hierarchy (`spec.md` §9): [`Bundle`] is itself a small
//! tagged enum and every method dispatches on it directly.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use crate::error::{DeployError, Result};
use crate::resource::Origin;

/// Separator used to address an archive-within-archive bundle location, e.g.
/// `app.zip!/natives.zip`. Borrowed from the long-standing "jar URL" convention for
/// the same idea.
pub const ARCHIVE_MARKER: &str = "!/";

enum BundleInner {
    Directory(PathBuf),
    Archive {
        path: PathBuf,
        zip: zip::ZipArchive<File>,
    },
    Nested {
        outer_path: PathBuf,
        inner_name: String,
        zip: zip::ZipArchive<Cursor<Vec<u8>>>,
    },
}

pub struct Bundle {
    inner: BundleInner,
}

fn io_err(path: &Path, e: impl Into<std::io::Error>) -> DeployError {
    DeployError::io(path.to_path_buf(), e.into())
}

impl Bundle {
    /// Opens a bundle from a location string. A location containing [`ARCHIVE_MARKER`]
    /// twice names an archive nested inside another; otherwise the location names a
    /// directory (if one exists there) or a single archive file.
    pub fn open(location: &str) -> Result<Bundle> {
        let marker_count = location.matches(ARCHIVE_MARKER).count();
        if marker_count >= 2 {
            let mut parts = location.splitn(3, ARCHIVE_MARKER);
            let outer = parts.next().unwrap_or_default();
            let inner_name = parts.next().unwrap_or_default().to_string();
            let outer_path = PathBuf::from(outer);
            let mut outer_zip = zip::ZipArchive::new(
                File::open(&outer_path).map_err(|e| io_err(&outer_path, e))?,
            )
            .map_err(|e| io_err(&outer_path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
            let mut inner_file = outer_zip
                .by_name(&inner_name)
                .map_err(|_| DeployError::ResourceNotFound {
                    template: inner_name.clone(),
                })?;
            let mut buf = Vec::with_capacity(inner_file.size() as usize);
            inner_file
                .read_to_end(&mut buf)
                .map_err(|e| io_err(&outer_path, e))?;
            drop(inner_file);
            let zip = zip::ZipArchive::new(Cursor::new(buf)).map_err(|e| {
                io_err(&outer_path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
            return Ok(Bundle {
                inner: BundleInner::Nested {
                    outer_path,
                    inner_name,
                    zip,
                },
            });
        }

        let path = PathBuf::from(location);
        if path.is_dir() {
            Ok(Bundle {
                inner: BundleInner::Directory(path),
            })
        } else {
            let zip = zip::ZipArchive::new(File::open(&path).map_err(|e| io_err(&path, e))?)
                .map_err(|e| io_err(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
            Ok(Bundle {
                inner: BundleInner::Archive { path, zip },
            })
        }
    }

    /// The archive or directory path this bundle was opened from (the outer archive,
    /// for a nested bundle) — used in error messages and origin tracking.
    pub fn location_path(&self) -> &Path {
        match &self.inner {
            BundleInner::Directory(p) => p,
            BundleInner::Archive { path, .. } => path,
            BundleInner::Nested { outer_path, .. } => outer_path,
        }
    }

    /// Lists immediate children of `dir` (non-recursive: entries nested in a
    /// subdirectory of `dir` are skipped), per `spec.md` §4.3.
    pub fn list_dir(&mut self, dir: &str) -> Result<Vec<(String, u64)>> {
        let dir_prefix = normalize_dir_prefix(dir);
        match &mut self.inner {
            BundleInner::Directory(base) => {
                let full_dir = base.join(&dir_prefix);
                let read_dir = match std::fs::read_dir(&full_dir) {
                    Ok(rd) => rd,
                    Err(_) => return Ok(Vec::new()),
                };
                let mut out = Vec::new();
                for entry in read_dir {
                    let entry = entry.map_err(|e| io_err(&full_dir, e))?;
                    let file_type = entry.file_type().map_err(|e| io_err(&full_dir, e))?;
                    if file_type.is_dir() {
                        continue;
                    }
                    let len = entry.metadata().map_err(|e| io_err(&full_dir, e))?.len();
                    if let Some(name) = entry.file_name().to_str() {
                        out.push((name.to_string(), len));
                    }
                }
                Ok(out)
            }
            BundleInner::Archive { zip, .. } | BundleInner::Nested { zip, .. } => {
                list_archive_dir(zip, &dir_prefix)
            }
        }
    }

    /// True iff an entry exactly named `full_path` exists.
    pub fn exists(&mut self, full_path: &str) -> bool {
        match &mut self.inner {
            BundleInner::Directory(base) => base.join(full_path).is_file(),
            BundleInner::Archive { zip, .. } => zip.by_name(full_path).is_ok(),
            BundleInner::Nested { zip, .. } => zip.by_name(full_path).is_ok(),
        }
    }

    /// Byte length of the entry named `full_path`.
    pub fn entry_length(&mut self, full_path: &str) -> Result<u64> {
        match &mut self.inner {
            BundleInner::Directory(base) => {
                let p = base.join(full_path);
                Ok(std::fs::metadata(&p).map_err(|e| io_err(&p, e))?.len())
            }
            BundleInner::Archive { zip, path } => zip
                .by_name(full_path)
                .map(|f| f.size())
                .map_err(|_| DeployError::ResourceNotFound {
                    template: format!("{}/{}", path.display(), full_path),
                }),
            BundleInner::Nested { zip, outer_path, .. } => zip
                .by_name(full_path)
                .map(|f| f.size())
                .map_err(|_| DeployError::ResourceNotFound {
                    template: format!("{}/{}", outer_path.display(), full_path),
                }),
        }
    }

    /// Opens a reader for the entry named `full_path` and reads it fully (resources
    /// are bounded to [`crate::resource::MAX_RESOURCE_LENGTH`] bytes, so buffering the
    /// whole thing is the simplest correct approach and matches how the single input
    /// buffer is sized in `spec.md` §4.4 "deploy_files").
    pub fn read_entry(&mut self, full_path: &str) -> Result<Vec<u8>> {
        match &mut self.inner {
            BundleInner::Directory(base) => {
                let p = base.join(full_path);
                std::fs::read(&p).map_err(|e| io_err(&p, e))
            }
            BundleInner::Archive { zip, path } => {
                let mut f = zip.by_name(full_path).map_err(|_| DeployError::ResourceNotFound {
                    template: format!("{}/{}", path.display(), full_path),
                })?;
                let mut buf = Vec::with_capacity(f.size() as usize);
                f.read_to_end(&mut buf).map_err(|e| io_err(path, e))?;
                Ok(buf)
            }
            BundleInner::Nested { zip, outer_path, .. } => {
                let mut f = zip.by_name(full_path).map_err(|_| DeployError::ResourceNotFound {
                    template: format!("{}/{}", outer_path.display(), full_path),
                })?;
                let mut buf = Vec::with_capacity(f.size() as usize);
                f.read_to_end(&mut buf).map_err(|e| io_err(outer_path, e))?;
                Ok(buf)
            }
        }
    }

    /// Builds the [`Origin`] a matched entry at `full_path` should carry.
    pub fn origin_for(&self, full_path: &str) -> Origin {
        match &self.inner {
            BundleInner::Directory(base) => Origin::FilePath(base.join(full_path)),
            BundleInner::Archive { path, .. } => Origin::ArchiveEntry {
                archive_path: path.clone(),
                inner_archive: None,
                entry_name: full_path.to_string(),
            },
            BundleInner::Nested {
                outer_path,
                inner_name,
                ..
            } => Origin::ArchiveEntry {
                archive_path: outer_path.clone(),
                inner_archive: Some(inner_name.clone()),
                entry_name: full_path.to_string(),
            },
        }
    }
}

/// Reads an [`Origin`]'s full bytes directly, independent of the [`Bundle`] it was
/// discovered through — by the time the engine deploys resources, enumeration (and
/// the archive handles it opened) may already be finished, since `Origin` carries
/// everything needed (`spec.md` §9 "avoid inheritance hierarchies") to reopen its
/// source on demand.
pub fn read_origin(origin: &Origin) -> Result<Vec<u8>> {
    match origin {
        Origin::FilePath(path) => std::fs::read(path).map_err(|e| io_err(path, e)),
        Origin::ArchiveEntry {
            archive_path,
            inner_archive: None,
            entry_name,
        } => {
            let mut zip = zip::ZipArchive::new(File::open(archive_path).map_err(|e| io_err(archive_path, e))?)
                .map_err(|e| io_err(archive_path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
            let mut f = zip.by_name(entry_name).map_err(|_| DeployError::ResourceNotFound {
                template: format!("{}/{}", archive_path.display(), entry_name),
            })?;
            let mut buf = Vec::with_capacity(f.size() as usize);
            f.read_to_end(&mut buf).map_err(|e| io_err(archive_path, e))?;
            Ok(buf)
        }
        Origin::ArchiveEntry {
            archive_path,
            inner_archive: Some(inner_name),
            entry_name,
        } => {
            let mut outer = zip::ZipArchive::new(File::open(archive_path).map_err(|e| io_err(archive_path, e))?)
                .map_err(|e| io_err(archive_path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
            let mut inner_file = outer.by_name(inner_name).map_err(|_| DeployError::ResourceNotFound {
                template: inner_name.clone(),
            })?;
            let mut inner_buf = Vec::with_capacity(inner_file.size() as usize);
            inner_file.read_to_end(&mut inner_buf).map_err(|e| io_err(archive_path, e))?;
            drop(inner_file);
            let mut inner_zip = zip::ZipArchive::new(Cursor::new(inner_buf))
                .map_err(|e| io_err(archive_path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
            let mut f = inner_zip.by_name(entry_name).map_err(|_| DeployError::ResourceNotFound {
                template: format!("{inner_name}/{entry_name}"),
            })?;
            let mut buf = Vec::with_capacity(f.size() as usize);
            f.read_to_end(&mut buf).map_err(|e| io_err(archive_path, e))?;
            Ok(buf)
        }
        Origin::StreamUrl(url) => Err(DeployError::io(
            PathBuf::from(url),
            std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "stream-url origins are not fetched by this crate",
            ),
        )),
    }
}

fn normalize_dir_prefix(dir: &str) -> String {
    if dir.is_empty() || dir.ends_with('/') {
        dir.to_string()
    } else {
        format!("{dir}/")
    }
}

fn list_archive_dir<R: std::io::Read + std::io::Seek>(
    zip: &mut zip::ZipArchive<R>,
    dir_prefix: &str,
) -> Result<Vec<(String, u64)>> {
    let mut out = Vec::new();
    for i in 0..zip.len() {
        let file = zip.by_index(i).map_err(|e| {
            DeployError::io(PathBuf::from(dir_prefix), std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        let name = file.name().to_string();
        if dir_prefix.is_empty() {
            if !name.contains('/') && !name.is_empty() {
                out.push((name, file.size()));
            }
            continue;
        }
        if let Some(rest) = name.strip_prefix(dir_prefix) {
            if !rest.is_empty() && !rest.contains('/') {
                out.push((rest.to_string(), file.size()));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_directory_bundle_list_dir_skips_subdirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hi").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"there").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.txt"), b"nope").unwrap();

        let mut bundle = Bundle::open(dir.path().to_str().unwrap()).unwrap();
        let mut names: Vec<String> = bundle
            .list_dir("")
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn test_archive_bundle_list_dir() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("bundle.zip");
        let file = File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let opts = zip::write::FileOptions::default();
        writer.start_file("resources/Linux/64/dummy1.txt.zst", opts).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.start_file("resources/Linux/64/dummy2.txt.zst", opts).unwrap();
        writer.write_all(b"world").unwrap();
        writer.start_file("resources/Linux/64/sub/nope.txt", opts).unwrap();
        writer.write_all(b"skip").unwrap();
        writer.finish().unwrap();

        let mut bundle = Bundle::open(zip_path.to_str().unwrap()).unwrap();
        let mut names: Vec<String> = bundle
            .list_dir("resources/Linux/64")
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["dummy1.txt.zst".to_string(), "dummy2.txt.zst".to_string()]
        );
    }
}
