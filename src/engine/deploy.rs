//! `deploy_files`, per `spec.md` §4.4.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::bundle::read_origin;
use crate::error::{DeployError, Result};
use crate::janitor::DirectoryLock;
use crate::resource::{derive_output_name, Resource, MAX_RESOURCE_LENGTH};

/// Chunk size for writes to the destination file: forced to disk between chunks so
/// the liveness beacon can be touched at a bounded interval even for large resources.
const MAX_CHUNK: usize = 1 << 24;

/// Writes every not-yet-locked entry of `resources` into `root`, in the order
/// `spec.md` §4.4 prescribes: already-locked (reused) entries skipped, the remainder
/// biggest-first so a full disk is discovered before small files are wasted on.
pub fn deploy_files(
    root: &Path,
    resources: &mut [Resource],
    dll_suffix: Option<&str>,
    lock: &mut DirectoryLock,
) -> Result<()> {
    let mut order: Vec<usize> = (0..resources.len()).collect();
    order.sort_by(|&a, &b| {
        let a_done = resources[a].read_lock.is_some();
        let b_done = resources[b].read_lock.is_some();
        a_done
            .cmp(&b_done)
            .then_with(|| resources[b].length.cmp(&resources[a].length))
    });

    for idx in order {
        if resources[idx].read_lock.is_some() {
            continue;
        }
        deploy_one(root, &mut resources[idx], dll_suffix, lock)?;
    }
    Ok(())
}

fn deploy_one(
    root: &Path,
    resource: &mut Resource,
    dll_suffix: Option<&str>,
    lock: &mut DirectoryLock,
) -> Result<()> {
    let raw = read_origin(&resource.origin)?;

    let mut data = if resource.is_compressed {
        decompress(&raw, &resource.display_name)?
    } else {
        raw
    };

    if resource.is_dynamic_library && !cfg!(windows) {
        if let Some(suffix) = dll_suffix {
            patch_self_reference(&mut data, &resource.display_name, suffix);
        }
    }

    let output_path = resource.output_path(root);
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&output_path)
        .map_err(|e| DeployError::io(output_path.clone(), e))?;
    file.try_lock_exclusive()
        .map_err(|e| DeployError::io(output_path.clone(), e))?;
    file.set_len(data.len() as u64)
        .map_err(|e| DeployError::io(output_path.clone(), e))?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| DeployError::io(output_path.clone(), e))?;

    for chunk in data.chunks(MAX_CHUNK) {
        file.write_all(chunk)
            .map_err(|e| DeployError::io(output_path.clone(), e))?;
        file.sync_data()
            .map_err(|e| DeployError::io(output_path.clone(), e))?;
        let _ = lock.touch();
    }
    FileExt::unlock(&file).map_err(|e| DeployError::io(output_path.clone(), e))?;
    drop(file);

    let read_file = OpenOptions::new()
        .read(true)
        .open(&output_path)
        .map_err(|e| DeployError::io(output_path.clone(), e))?;
    read_file
        .try_lock_shared()
        .map_err(|e| DeployError::io(output_path.clone(), e))?;
    resource.read_lock = Some(read_file);

    Ok(())
}

fn decompress(compressed: &[u8], display_name: &str) -> Result<Vec<u8>> {
    let data = zstd::stream::decode_all(compressed)
        .map_err(|e| DeployError::io(PathBuf::from(display_name), e))?;
    if data.len() as i64 > MAX_RESOURCE_LENGTH {
        return Err(DeployError::ResourceInvalid {
            name: display_name.to_string(),
            reason: "decompressed size exceeds the 31-bit resource counter".to_string(),
        });
    }
    Ok(data)
}

/// Non-Windows library self-reference patch, per `spec.md` §4.4 "Library
/// self-reference patch": only applies when the patched name is no longer than the
/// original (`len(suffix) <= len(original)` per spec, restated here as a direct
/// length comparison between the two derived names), scans for the literal original
/// output name and overwrites it in place, zero-padding the remainder. Relies on the
/// source having been built with a placeholder of the original name's exact length
/// embedded at that location.
fn patch_self_reference(data: &mut [u8], display_name: &str, suffix: &str) {
    let original = derive_output_name(display_name, None);
    let patched = derive_output_name(display_name, Some(suffix));
    if patched.len() > original.len() {
        return;
    }
    let Some(pos) = find_subsequence(data, original.as_bytes()) else {
        return;
    };
    let mut replacement = patched.into_bytes();
    replacement.resize(original.len(), 0);
    data[pos..pos + original.len()].copy_from_slice(&replacement);
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::resource::Origin;

    fn make_source_resource(dir: &Path, display_name: &str, content: &[u8]) -> Resource {
        let src = dir.join(format!("src-{display_name}"));
        std::fs::write(&src, content).unwrap();
        let is_compressed = display_name.ends_with("_zst") || display_name.ends_with(".zst");
        let output_name = derive_output_name(display_name, None);
        Resource::new(
            Origin::FilePath(src),
            display_name.to_string(),
            output_name,
            is_compressed,
            content.len() as i64,
            0,
        )
    }

    #[test]
    fn test_deploy_uncompressed_resource() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let mut lock = DirectoryLock::try_create(&root).unwrap();

        let mut resources = vec![make_source_resource(dir.path(), "dummy1_txt", b"hello")];
        deploy_files(&root, &mut resources, None, &mut lock).unwrap();

        assert_eq!(std::fs::read(root.join("dummy1.txt")).unwrap(), b"hello");
        assert!(resources[0].read_lock.is_some());
    }

    #[test]
    fn test_deploy_compressed_resource() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let mut lock = DirectoryLock::try_create(&root).unwrap();

        let compressed = zstd::encode_all(&b"payload"[..], 0).unwrap();
        let mut resources = vec![make_source_resource(dir.path(), "dummy1_txt_zst", &compressed)];
        deploy_files(&root, &mut resources, None, &mut lock).unwrap();

        assert_eq!(std::fs::read(root.join("dummy1.txt")).unwrap(), b"payload");
    }

    #[test]
    fn test_deploy_biggest_first_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();
        let mut lock = DirectoryLock::try_create(&root).unwrap();

        let mut resources = vec![
            make_source_resource(dir.path(), "small_txt", b"x"),
            make_source_resource(dir.path(), "big_txt", b"xxxxxxxxxx"),
        ];
        deploy_files(&root, &mut resources, None, &mut lock).unwrap();

        assert!(root.join("small.txt").exists());
        assert!(root.join("big.txt").exists());
    }

    #[test]
    fn test_patch_self_reference_skipped_when_patched_name_longer() {
        let display_name = format!("libfoo_{}", crate::platform::DLLEXT);
        let original = derive_output_name(&display_name, None);
        let mut data = format!("prefix {original} suffix").into_bytes();
        let before = data.clone();
        // a longer suffix than the original name can absorb: patch must be skipped.
        patch_self_reference(&mut data, &display_name, "_much_longer_suffix");
        assert_eq!(data, before);
    }

    #[test]
    fn test_patch_self_reference_applies_when_not_longer() {
        let display_name = format!("libfoolib_{}", crate::platform::DLLEXT);
        let original = derive_output_name(&display_name, None);
        let suffix = "_a";
        let patched_name = derive_output_name(&display_name, Some(suffix));
        assert!(patched_name.len() <= original.len());

        let mut data = format!("prefix {original} suffix").into_bytes();
        patch_self_reference(&mut data, &display_name, suffix);

        let as_str = String::from_utf8_lossy(&data);
        assert!(as_str.contains(&patched_name));
    }
}
