//! Input path resolution: a single file, a directory tree, or a glob.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::Result;

/// Resolve `path` to an ordered list of files.
///
/// * file → that file alone
/// * directory → every file below it, depth-first, names sorted per directory
/// * anything else → glob pattern, in expansion order
pub fn resolve_paths(path: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if path.is_file() {
        out.push(path.to_path_buf());
    } else if path.is_dir() {
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() {
                out.push(entry.into_path());
            }
        }
    } else {
        let pattern = path.to_string_lossy();
        for entry in glob::glob(&pattern)? {
            let p = entry?;
            if p.is_file() {
                out.push(p);
            }
        }
    }
    if out.is_empty() {
        tracing::warn!(path = %path.display(), "no input files resolved");
    } else {
        tracing::debug!(path = %path.display(), files = out.len(), "resolved input files");
    }
    Ok(out)
}
