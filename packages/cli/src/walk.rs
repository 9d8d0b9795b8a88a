//! Turns local paths into upload candidates.
//!
//! A file argument uploads as its file name. A directory argument uploads
//! every file below it with the directory's own name as the first path
//! segment, so `photos/` lands at `<dest>/photos/...`.

use std::path::{Path, PathBuf};

/// A local file and the relative path it uploads under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub relative_path: String,
    pub path: PathBuf,
}

/// Walks `paths` into a flat, sorted list of files.
///
/// # Errors
///
/// Returns an I/O error if a path does not exist or a directory cannot be
/// read.
pub fn collect(paths: &[PathBuf]) -> std::io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();

    for path in paths {
        let meta = std::fs::metadata(path)?;
        let name = file_name(path);
        if meta.is_dir() {
            walk_dir(path, &name, &mut files)?;
        } else {
            files.push(LocalFile {
                relative_path: name,
                path: path.clone(),
            });
        }
    }

    Ok(files)
}

fn walk_dir(dir: &Path, relative: &str, files: &mut Vec<LocalFile>) -> std::io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .collect();
    entries.sort();

    for path in entries {
        let child = format!("{relative}/{}", file_name(&path));
        if path.is_dir() {
            walk_dir(&path, &child, files)?;
        } else if path.is_file() {
            files.push(LocalFile {
                relative_path: child,
                path,
            });
        }
    }

    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |n| n.to_string_lossy().into_owned(),
    )
}
