//! Package declarations and source-root layout.
//!
//! A Java file declaring `package a.b;` is expected to live in `<root>/a/b/`.
//! Given the file path and its package, the enclosing source root can be
//! recovered; given a known root, the expected package can be computed.

use jml_core::SourceRoots;
use std::path::{Path, PathBuf};

/// Source root implied by `file` declaring `package`.
///
/// Returns `None` if the directory layout does not match the package.
pub fn source_root_for(file: &Path, package: &str) -> Option<PathBuf> {
    let dir = file.parent()?;
    let segments: Vec<&str> = package.split('.').map(str::trim).collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }

    let package_dir: PathBuf = segments.iter().collect();
    if !dir.ends_with(&package_dir) {
        return None;
    }
    dir.ancestors().nth(segments.len()).map(Path::to_path_buf)
}

/// Package a file under `root` must declare (empty for the default package).
pub fn expected_package(root: &Path, file: &Path) -> Option<String> {
    let dir = file.parent()?;
    let relative = dir.strip_prefix(root).ok()?;
    let segments: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(segments.join("."))
}

/// Checks `declared` against every known root enclosing `file`.
///
/// Returns the package expected by the deepest enclosing root when no
/// enclosing root agrees with the declaration. Files outside all known roots
/// are never flagged.
pub fn package_mismatch(roots: &SourceRoots, file: &Path, declared: &str) -> Option<String> {
    let mut enclosing: Vec<&Path> = roots.iter().filter(|root| file.starts_with(root)).collect();
    if enclosing.is_empty() {
        return None;
    }

    let matches = enclosing
        .iter()
        .filter_map(|root| expected_package(root, file))
        .any(|expected| expected == declared);
    if matches {
        return None;
    }

    enclosing.sort_by_key(|root| root.components().count());
    enclosing
        .last()
        .and_then(|root| expected_package(root, file))
}
