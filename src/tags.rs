//! Tag grammar: `[key@value]` substrings embedded in a resource's on-bundle name.
//!
//! A tag is any `[key@value]` substring where neither `key` nor `value` contains `@`
//! or `]` (`value` *may* contain a stray `[`, see the `S4` example in `spec.md` §8).
//! `strip_tags` is a pure, round-trip-safe parse: it never validates tag keys — that's
//! the enumerator's job (`spec.md` §4.3), since the set of recognized keys is a
//! property of where the tag is being used, not of the grammar itself.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^@\]]*)@([^@\]]*)\]").unwrap());

/// Strips every `[key@value]` tag from `name`, returning the stripped name and the
/// tags found, in left-to-right order of appearance.
pub fn strip_tags(name: &str) -> (String, Vec<(String, String)>) {
    let tags = TAG_RE
        .captures_iter(name)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();
    let stripped = TAG_RE.replace_all(name, "").into_owned();
    (stripped, tags)
}

/// Inserts a `[key@value]` tag into `name` at the given byte offset. Exists for the
/// round-trip property test in `spec.md` §8 invariant 4: `strip_tags(add_tag(s, k,
/// v))` reconstructs `s`, modulo where the tag landed.
#[cfg(test)]
pub fn add_tag(name: &str, key: &str, value: &str, at: usize) -> String {
    let mut out = String::with_capacity(name.len() + key.len() + value.len() + 3);
    out.push_str(&name[..at]);
    out.push('[');
    out.push_str(key);
    out.push('@');
    out.push_str(value);
    out.push(']');
    out.push_str(&name[at..]);
    out
}
