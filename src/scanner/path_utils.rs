//! Path comparison helpers.
//!
//! Folder roots are compared component by component after NFC
//! normalization and lowercasing. That makes `Café` (NFD) and `café` (NFC)
//! the same folder, and keeps containment boundary-aware: `/data/foo` is not
//! inside `/data/foobar`.
//!
//! ```
//! use std::path::Path;
//! use dupsweep::scanner::path_utils::{is_within, paths_equal};
//!
//! assert!(paths_equal(Path::new("/Data/cafe\u{0301}"), Path::new("/data/café")));
//! assert!(is_within(Path::new("/data/foo/bar"), Path::new("/DATA/foo")));
//! assert!(!is_within(Path::new("/data/foobar"), Path::new("/data/foo")));
//! ```

use std::path::{Component, Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

/// Normalize a string to NFC form.
#[must_use]
pub fn normalize_path_str(s: &str) -> String {
    s.nfc().collect()
}

/// Comparison key for one path component.
fn component_key(component: Component<'_>) -> Option<String> {
    match component {
        Component::CurDir => None,
        Component::RootDir => Some(String::from("/")),
        other => Some(
            normalize_path_str(&other.as_os_str().to_string_lossy()).to_lowercase(),
        ),
    }
}

/// Per-component comparison keys for a path.
#[must_use]
pub fn component_keys(path: &Path) -> Vec<String> {
    path.components().filter_map(component_key).collect()
}

/// A single normalized, case-folded key for the whole path.
#[must_use]
pub fn path_key(path: &Path) -> String {
    component_keys(path).join("\u{0}")
}

/// Whether two paths name the same location, ignoring case and Unicode form.
#[must_use]
pub fn paths_equal(a: &Path, b: &Path) -> bool {
    component_keys(a) == component_keys(b)
}

/// Whether `path` equals `ancestor` or lies beneath it.
#[must_use]
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    let path = component_keys(path);
    let ancestor = component_keys(ancestor);
    path.len() >= ancestor.len() && path[..ancestor.len()] == ancestor[..]
}

/// Drop `.` components and fold each `..` into its parent, without touching
/// the filesystem. A `..` at the root stays at the root; a leading `..` on a
/// relative path is kept.
#[must_use]
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                Some(Component::ParentDir | Component::CurDir) | None => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `path` relative to `ancestor`, using the real (not folded) components of
/// `path`. `None` when `path` is not within `ancestor`.
#[must_use]
pub fn relative_to(path: &Path, ancestor: &Path) -> Option<PathBuf> {
    if !is_within(path, ancestor) {
        return None;
    }
    let skip = component_keys(ancestor).len();
    Some(
        path.components()
            .filter(|c| !matches!(c, Component::CurDir))
            .skip(skip)
            .collect(),
    )
}
