//! Output merging
//!
//! Workers that run disjoint slices of a plan each write one fragment. This
//! module combines the fragments into one dataset with globally unique run
//! numbers and a deterministic row order.

pub mod format;
pub mod merger;

// Re-export main types
pub use format::*;
pub use merger::*;

use crate::error::{MergeError, MergeResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Expand fragment arguments into paths
///
/// Each argument may be a plain path or a glob pattern. Matches of a pattern
/// are sorted so the merge order does not depend on directory listing order.
/// A pattern without glob characters is kept as is even when it matches
/// nothing, so that a missing file is reported when it is read.
pub fn expand_patterns<S: AsRef<str>>(patterns: &[S]) -> MergeResult<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        let pattern = pattern.as_ref();
        if !pattern.contains(['*', '?', '[']) {
            paths.push(PathBuf::from(pattern));
            continue;
        }

        let entries = glob::glob(pattern).map_err(|e| MergeError::Pattern {
            pattern: pattern.to_string(),
            error: e.to_string(),
        })?;

        let mut matched: Vec<PathBuf> = entries.filter_map(|entry| entry.ok()).collect();
        matched.sort();
        debug!(pattern, matches = matched.len(), "expanded fragment pattern");
        paths.extend(matched);
    }

    Ok(paths)
}

/// Merge fragment files in the given order
pub fn merge_paths<P: AsRef<Path>>(paths: &[P]) -> MergeResult<MergedTable> {
    let mut merger = Merger::new();
    for path in paths {
        merger.add_path(path.as_ref())?;
    }
    merger.finish()
}
