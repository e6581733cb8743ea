//! Source loading from the filesystem.
//!
//! Documents that are not open in the editor (or whose open text is not
//! known yet) are parsed from disk. Loading runs on parse workers, so it is
//! plain blocking I/O.
//!
//! # Error Handling
//!
//! Errors are returned to the parser adapter, which turns them into a
//! reportable problem for the document instead of failing the pipeline.

use crate::error::{JmlError, Result};
use std::path::Path;

/// Maximum allowed file size in bytes (50MB).
pub const MAX_FILE_SIZE: u64 = 50_000_000;

/// Files above this size are still loaded, with a warning.
const LARGE_FILE_WARNING: u64 = 10_000_000;

/// Loads source text from disk.
///
/// # Errors
///
/// - `JmlError::FileTooLarge` - file exceeds [`MAX_FILE_SIZE`]
/// - `JmlError::Io` - not found, permission denied, not valid UTF-8, ...
pub fn load_source(path: &Path) -> Result<String> {
    tracing::debug!("loading source from disk: {}", path.display());

    let size = std::fs::metadata(path)
        .map_err(|e| {
            tracing::debug!("failed to read metadata for {}: {}", path.display(), e);
            JmlError::Io(e)
        })?
        .len();

    if size > MAX_FILE_SIZE {
        tracing::error!(
            "source exceeds maximum size: {} bytes (limit: {} bytes)",
            size,
            MAX_FILE_SIZE
        );
        return Err(JmlError::FileTooLarge {
            size,
            limit: MAX_FILE_SIZE,
        });
    }

    if size > LARGE_FILE_WARNING {
        tracing::warn!(
            "source is very large: {} bytes. Parsing may be slow.",
            size
        );
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        tracing::debug!("failed to read file {}: {}", path.display(), e);
        JmlError::Io(e)
    })?;

    tracing::trace!("loaded {} ({} bytes)", path.display(), content.len());
    Ok(content)
}
