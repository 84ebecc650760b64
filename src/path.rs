//! Path utilities (C1): case-insensitive compare, long-path prefixing,
//! normalize, join, split.

use std::path::{Path, PathBuf};

use crate::error::{FsResult, NtStatus};

/// Windows' `\\?\` long-path prefix, used to bypass `MAX_PATH` when talking
/// to OS APIs. On non-Windows hosts the prefix is meaningless, so
/// [`with_long_path_prefix`] is a no-op there.
pub const LONG_PATH_PREFIX: &str = r"\\?\";

/// Case-insensitive (ASCII + simple Unicode casefold) equality, used for
/// every VDT name comparison.
pub fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

/// Lower-cases a name the same way for every comparison and cache site, so
/// `FileNode::name_lower` and pattern matching agree.
pub fn casefold(name: &str) -> String {
    name.to_lowercase()
}

/// Splits a backslash-separated virtual path into its non-empty components.
///
/// `"\"`, `""`, and `"\\"` all split to an empty component list (the root).
pub fn split_components(path: &str) -> Vec<&str> {
    path.split(['\\', '/']).filter(|c| !c.is_empty()).collect()
}

/// Normalizes a virtual path: converts `/` to `\`, collapses repeated
/// separators, and strips a trailing separator (except for the bare root).
pub fn normalize(path: &str) -> String {
    let components = split_components(path);
    if components.is_empty() {
        return "\\".to_string();
    }
    let mut out = String::with_capacity(path.len());
    for c in components {
        out.push('\\');
        out.push_str(c);
    }
    out
}

/// Joins a real directory with a single child name.
pub fn join(base: &Path, name: &str) -> PathBuf {
    base.join(name)
}

/// Prepends the long-path prefix on Windows; returns the path unchanged
/// elsewhere (there is no equivalent convention on other platforms).
#[cfg(windows)]
pub fn with_long_path_prefix(path: &Path) -> PathBuf {
    let s = path.as_os_str().to_string_lossy();
    if s.starts_with(LONG_PATH_PREFIX) {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{LONG_PATH_PREFIX}{s}"))
    }
}

#[cfg(not(windows))]
pub fn with_long_path_prefix(path: &Path) -> PathBuf {
    path.to_path_buf()
}

/// Validates a single path component: rejects empty names and the two
/// reserved relative components.
pub fn is_valid_component(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".."
}

/// Returns the last component of a backslash-separated virtual path, or
/// [`NtStatus::ObjectNameInvalid`] if the path has none (the bare root).
/// Shared by the dispatcher (§4.3) and the rename handler (§4.5).
pub fn last_component(vpath: &str) -> FsResult<String> {
    split_components(vpath).last().map(|s| s.to_string()).ok_or(NtStatus::ObjectNameInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_components_ignores_separators_and_empties() {
        assert_eq!(split_components("\\"), Vec::<&str>::new());
        assert_eq!(split_components(""), Vec::<&str>::new());
        assert_eq!(split_components("\\a\\b\\"), vec!["a", "b"]);
        assert_eq!(split_components("/a/b"), vec!["a", "b"]);
    }

    #[test]
    fn normalize_collapses_and_roots() {
        assert_eq!(normalize(""), "\\");
        assert_eq!(normalize("\\"), "\\");
        assert_eq!(normalize("a/b/"), "\\a\\b");
        assert_eq!(normalize("\\\\a\\\\b"), "\\a\\b");
    }

    #[test]
    fn eq_ignore_case_matches_mixed_case() {
        assert!(eq_ignore_case("README.TXT", "readme.txt"));
        assert!(!eq_ignore_case("a.txt", "b.txt"));
    }

    #[test]
    fn component_validation_rejects_dot_segments() {
        assert!(is_valid_component("file.txt"));
        assert!(!is_valid_component(""));
        assert!(!is_valid_component("."));
        assert!(!is_valid_component(".."));
    }
}
