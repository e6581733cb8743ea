//! Registry of discovered project source roots.
//!
//! Roots are appended from parse workers as files are parsed and read by the
//! parser in the middle of other parses. The registry is append-only: writers
//! swap in a new shared list under a write lock, readers clone the current
//! list and never observe a half-applied append.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Append-only, deduplicated set of source roots shared by all parses.
#[derive(Debug, Default)]
pub struct SourceRootRegistry {
    roots: RwLock<Arc<[PathBuf]>>,
}

impl SourceRootRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a root. Returns `false` if it was already known.
    pub fn register(&self, root: PathBuf) -> bool {
        let mut roots = self.roots.write().unwrap_or_else(PoisonError::into_inner);
        if roots.contains(&root) {
            return false;
        }

        tracing::info!("registered source root {}", root.display());
        let mut next = Vec::with_capacity(roots.len() + 1);
        next.extend(roots.iter().cloned());
        next.push(root);
        *roots = next.into();
        true
    }

    /// Point-in-time view of the registered roots.
    pub fn snapshot(&self) -> SourceRoots {
        let roots = self.roots.read().unwrap_or_else(PoisonError::into_inner);
        SourceRoots(Arc::clone(&roots))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable snapshot of a [`SourceRootRegistry`], in registration order.
#[derive(Debug, Clone, Default)]
pub struct SourceRoots(Arc<[PathBuf]>);

impl SourceRoots {
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The deepest registered root that contains `path`.
    pub fn enclosing(&self, path: &Path) -> Option<&Path> {
        self.iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
    }
}

impl From<Vec<PathBuf>> for SourceRoots {
    fn from(roots: Vec<PathBuf>) -> Self {
        Self(roots.into())
    }
}
