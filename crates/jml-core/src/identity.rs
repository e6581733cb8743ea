//! Canonical document identities used as cache keys.

use crate::error::{JmlError, Result};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tower_lsp_server::ls_types::Uri;

/// Canonical key identifying a source document.
///
/// Built from a `file://` URI or a filesystem path. Paths are normalized
/// lexically (`.` and `..` removed) and then resolved through the filesystem
/// when the file exists, so symlinked or relative spellings of the same file
/// produce the same identity.
///
/// Cloning is cheap (shared path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileIdentity(Arc<Path>);

impl FileIdentity {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let normalized = normalize(path.as_ref());
        let canonical = std::fs::canonicalize(&normalized).unwrap_or(normalized);
        Self(Arc::from(canonical))
    }

    /// Resolves a document URI to an identity.
    ///
    /// # Errors
    ///
    /// Returns [`JmlError::InvalidUri`] for anything that is not a `file://` URI.
    pub fn from_uri(uri: &Uri) -> Result<Self> {
        let path = uri
            .scheme()
            .as_str()
            .eq_ignore_ascii_case("file")
            .then(|| uri.to_file_path())
            .flatten();
        match path {
            Some(path) => Ok(Self::from_path(path)),
            None => {
                tracing::debug!("rejecting non-file URI: {}", uri.as_str());
                Err(JmlError::InvalidUri(uri.as_str().to_string()))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// URI used when talking to the client about this document.
    pub fn to_uri(&self) -> Option<Uri> {
        Uri::from_file_path(&*self.0)
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `/..` is `/`
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}
