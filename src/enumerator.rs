//! Resource Enumerator: discovers the resources named by an expanded source
//! template within a [`Bundle`], per `spec.md` §4.3.

use crate::bundle::Bundle;
use crate::error::{DeployError, Result};
use crate::platform::DLLEXT;
use crate::resource::{derive_output_name, Resource, MAX_RESOURCE_LENGTH, ORDER_TAG_OFFSET};
use crate::tags::strip_tags;

/// Enumerates every resource matched by `expanded_source` (already run through
/// [`crate::template::expand_source`]) within `bundle`.
pub fn enumerate(
    bundle: &mut Bundle,
    expanded_source: &str,
    dll_suffix: Option<&str>,
) -> Result<Vec<Resource>> {
    if expanded_source.matches('*').count() > 1 {
        return Err(DeployError::TemplateSyntax {
            template: expanded_source.to_string(),
            reason: "at most one '*' is allowed in a source template".to_string(),
        });
    }

    if let Some(star) = expanded_source.find('*') {
        let (_, pattern) = split_dir_and_name(expanded_source);
        // `pattern` is everything after the last '/'; a '*' anywhere before that
        // point sits inside a directory component, which this crate doesn't glob.
        if star < expanded_source.len() - pattern.len() {
            return Err(DeployError::TemplateSyntax {
                template: expanded_source.to_string(),
                reason: "'*' must appear in the final path segment, not a directory component"
                    .to_string(),
            });
        }
    }

    let resources = if expanded_source.contains('*') {
        enumerate_glob(bundle, expanded_source, dll_suffix)?
    } else {
        vec![enumerate_single(bundle, expanded_source, dll_suffix)?]
    };

    if resources.is_empty() {
        return Err(DeployError::ResourceNotFound {
            template: expanded_source.to_string(),
        });
    }

    check_unique_output_names(&resources)?;
    Ok(resources)
}

fn check_unique_output_names(resources: &[Resource]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for r in resources {
        if !seen.insert(&r.output_name) {
            return Err(DeployError::ResourceInvalid {
                name: r.output_name.clone(),
                reason: "duplicate output name within one deployment".to_string(),
            });
        }
    }
    Ok(())
}

fn split_dir_and_name(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

fn join_dir(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// The four `{with/without "lib" prefix} x {with "."/"_" extension separator}`
/// fallback variants tried when a direct lookup for a library-looking name fails
/// (`spec.md` §4.3).
fn library_fallback_candidates(path: &str) -> Vec<String> {
    let (dir, base) = split_dir_and_name(path);
    let stem = base
        .strip_suffix(&format!(".{DLLEXT}"))
        .or_else(|| base.strip_suffix(&format!("_{DLLEXT}")));
    let Some(stem) = stem else {
        return Vec::new();
    };
    let stem = stem.strip_prefix("lib").unwrap_or(stem);
    let mut out = Vec::new();
    for lib_prefix in ["", "lib"] {
        for sep in [".", "_"] {
            out.push(join_dir(dir, &format!("{lib_prefix}{stem}{sep}{DLLEXT}")));
        }
    }
    out
}

fn enumerate_single(
    bundle: &mut Bundle,
    expanded_source: &str,
    dll_suffix: Option<&str>,
) -> Result<Resource> {
    let resolved_path = if bundle.exists(expanded_source) {
        Some(expanded_source.to_string())
    } else {
        library_fallback_candidates(expanded_source)
            .into_iter()
            .find(|candidate| bundle.exists(candidate))
    };

    let Some(resolved_path) = resolved_path else {
        return Err(DeployError::ResourceNotFound {
            template: expanded_source.to_string(),
        });
    };

    let (_, basename) = split_dir_and_name(&resolved_path);
    build_resource(bundle, &resolved_path, basename, 0, dll_suffix)
}

fn enumerate_glob(
    bundle: &mut Bundle,
    expanded_source: &str,
    dll_suffix: Option<&str>,
) -> Result<Vec<Resource>> {
    let (dir_prefix, pattern) = split_dir_and_name(expanded_source);
    let Some(star) = pattern.find('*') else {
        return Err(DeployError::TemplateSyntax {
            template: expanded_source.to_string(),
            reason: "'*' must appear in the final path segment, not a directory component"
                .to_string(),
        });
    };
    let file_prefix = &pattern[..star];
    let file_suffix = &pattern[star + 1..];

    let entries = bundle.list_dir(dir_prefix)?;
    let mut resources = Vec::new();
    let mut index: i64 = 0;
    for (basename, _len) in entries {
        if !basename.starts_with(file_prefix) || !basename.ends_with(file_suffix) {
            continue;
        }
        if basename.len() < file_prefix.len() + file_suffix.len() {
            continue;
        }
        let full_path = join_dir(dir_prefix, &basename);
        let resource = build_resource(bundle, &full_path, &basename, index, dll_suffix)?;
        resources.push(resource);
        index += 1;
    }
    Ok(resources)
}

/// `enum_index` is only used when the entry carries no explicit `[order@N]` tag.
fn build_resource(
    bundle: &mut Bundle,
    full_path: &str,
    basename: &str,
    enum_index: i64,
    dll_suffix: Option<&str>,
) -> Result<Resource> {
    let (display_name, raw_tags) = strip_tags(basename);

    let mut order: Option<i64> = None;
    for (key, value) in raw_tags {
        match key.as_str() {
            "order" => {
                let parsed: i64 = value.parse().map_err(|_| DeployError::TemplateSyntax {
                    template: basename.to_string(),
                    reason: format!("order tag value {value:?} is not a non-negative integer"),
                })?;
                if parsed < 0 {
                    return Err(DeployError::TemplateSyntax {
                        template: basename.to_string(),
                        reason: format!("order tag value {value:?} is negative"),
                    });
                }
                order = Some(parsed + ORDER_TAG_OFFSET);
            }
            other => {
                return Err(DeployError::TemplateSyntax {
                    template: basename.to_string(),
                    reason: format!("unknown tag key {other:?}"),
                });
            }
        }
    }

    let is_compressed = display_name.ends_with("_zst") || display_name.ends_with(".zst");
    let output_name = derive_output_name(&display_name, dll_suffix);
    let length = bundle.entry_length(full_path)? as i64;
    if length < 0 || length > MAX_RESOURCE_LENGTH {
        return Err(DeployError::ResourceInvalid {
            name: output_name,
            reason: format!("length {length} does not fit the 31-bit resource counter"),
        });
    }

    let origin = bundle.origin_for(full_path);
    Ok(Resource::new(
        origin,
        display_name,
        output_name,
        is_compressed,
        length,
        order.unwrap_or(enum_index),
    ))
}
