//! Template discovery.
//!
//! Walks a root directory and selects files whose root-relative path
//! matches one of the glob patterns. Any entry matching an ignore pattern
//! is pruned, so ignoring a directory skips everything beneath it.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::Result;

/// Build a glob set from a list of patterns.
fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Find templates under `root`.
///
/// Returns absolute paths in a stable (file-name sorted) walk order.
pub fn find_templates(root: &Path, globs: &[String], ignore: &[String]) -> Result<Vec<PathBuf>> {
    let root = root.canonicalize()?;
    let include = build_set(globs)?;
    let exclude = build_set(ignore)?;

    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| match entry.path().strip_prefix(&root) {
            // The root itself is never pruned
            Ok(rel) if rel.as_os_str().is_empty() => true,
            Ok(rel) => !exclude.is_match(rel),
            Err(_) => true,
        });

    let mut templates = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(&root) else {
            continue;
        };
        if include.is_match(rel) {
            templates.push(entry.into_path());
        }
    }

    tracing::debug!(root = %root.display(), count = templates.len(), "Discovered templates");
    Ok(templates)
}
