//! Platform facts used by the template expander and the deployment engine: which OS
//! we're running on, pointer width, and the native dynamic-library extension.

/// `$(OS)` substitution value.
pub const OS: &str = if cfg!(target_os = "windows") {
    "Windows"
} else if cfg!(target_os = "macos") {
    "OSX"
} else {
    "Linux"
};

/// `$(ARCH)` substitution value: platform pointer width, not CPU family.
pub const ARCH: &str = if cfg!(target_pointer_width = "64") {
    "64"
} else {
    "32"
};

/// `$(DLLEXT)` substitution value, without the leading dot.
pub const DLLEXT: &str = if cfg!(target_os = "windows") {
    "dll"
} else if cfg!(target_os = "macos") {
    "dylib"
} else {
    "so"
};

/// True iff `name` ends in the platform's native dynamic-library extension.
pub fn is_dynamic_library_name(name: &str) -> bool {
    name.rsplit('.').next() == Some(DLLEXT)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_is_dynamic_library_name() {
        assert!(is_dynamic_library_name(&format!("foo.{DLLEXT}")));
        assert!(!is_dynamic_library_name("foo.txt"));
        assert!(!is_dynamic_library_name("foo"));
    }
}
