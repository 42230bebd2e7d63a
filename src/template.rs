//! Template Expander: substitutes `$(NAME)` placeholders in resource and deployment
//! path templates.
//!
//! Substitution happens in a single pass, in this fixed order: `OS`, `ARCH`,
//! `DLLEXT`, `VERSION`, and then — destination templates only — `TEMP` and `RANDOM`.
//! Anything left looking like `$(...` after that pass is a hard error.

use std::env;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DeployError, Result};
use crate::platform;

/// 4-8 hex digit token used both for `$(RANDOM)` substitution and, independently, for
/// matching fallback-root subdirectories during cleanup (`spec.md` §4.2, §4.4).
pub fn random_token() -> String {
    static ALPHABET: &[u8] = b"0123456789abcdef";
    let len = fastrand::usize(4..=8);
    (0..len)
        .map(|_| ALPHABET[fastrand::usize(0..ALPHABET.len())] as char)
        .collect()
}

static RANDOM_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{4,8}$").unwrap());

/// True iff `name` looks like a `$(RANDOM)`-generated fallback-root basename.
pub fn looks_like_random_token(name: &str) -> bool {
    RANDOM_TOKEN_RE.is_match(name)
}

fn forbidden_char(c: char) -> bool {
    c.is_whitespace() || c == '\\' || c == '?'
}

/// Expands `$(NAME)` placeholders against the running platform plus `version`.
///
/// `allow_temp_random` gates `TEMP`/`RANDOM`, which `spec.md` §4.1 documents as
/// "destination only".
pub fn expand(template: &str, version: &str, allow_temp_random: bool) -> Result<String> {
    if !allow_temp_random {
        if let Some(c) = template.chars().find(|c| forbidden_char(*c)) {
            return Err(DeployError::TemplateSyntax {
                template: template.to_string(),
                reason: format!("forbidden character {c:?} in source template"),
            });
        }
    }

    let mut out = template.replace("$(OS)", platform::OS);
    out = out.replace("$(ARCH)", platform::ARCH);
    out = out.replace("$(DLLEXT)", platform::DLLEXT);
    out = out.replace("$(VERSION)", version);

    if allow_temp_random {
        if out.contains("$(TEMP)") {
            let temp = env::temp_dir();
            let temp_str = temp.to_string_lossy().replace('\\', "/");
            out = out.replace("$(TEMP)", &temp_str);
        }
        if out.contains("$(RANDOM)") {
            let token = format!("/{}", random_token());
            out = out.replace("$(RANDOM)", &token);
        }
    }

    check_residual(template, &out)?;
    Ok(out)
}

/// Expands a resource source template. `version` defaults to `"0"` upstream when the
/// caller has no package/assembly version to report (`spec.md` §4.1).
pub fn expand_source(template: &str, version: &str) -> Result<String> {
    expand(template, version, false)
}

/// Expands a deployment destination template.
pub fn expand_destination(template: &str, version: &str) -> Result<String> {
    expand(template, version, true)
}

fn check_residual(original: &str, expanded: &str) -> Result<()> {
    if let Some(idx) = expanded.find("$(") {
        let rest = &expanded[idx + 2..];
        return match rest.find(')') {
            None => Err(DeployError::TemplateSyntax {
                template: original.to_string(),
                reason: "key not terminated".to_string(),
            }),
            Some(end) => Err(DeployError::TemplateSyntax {
                template: original.to_string(),
                reason: format!("unknown key {:?}", &rest[..end]),
            }),
        };
    }
    Ok(())
}

/// Templates always use `/` as a path separator; this converts an expanded template
/// string into a native [`std::path::PathBuf`].
pub fn to_native_path(expanded: &str) -> std::path::PathBuf {
    let mut path = std::path::PathBuf::new();
    for piece in expanded.split('/') {
        if piece.is_empty() {
            continue;
        }
        path.push(piece);
    }
    if expanded.starts_with('/') {
        // preserve absoluteness on unix; on windows an expanded drive letter
        // (e.g. "C:/foo") already round-trips through PathBuf correctly without this.
        if cfg!(unix) {
            let mut absolute = std::path::PathBuf::from("/");
            absolute.push(path);
            return absolute;
        }
    }
    path
}
