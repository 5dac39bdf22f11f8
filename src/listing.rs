//! Directory listing.

use std::io;
use std::path::Path;

use chrono::{DateTime, Local};
use thiserror::Error;

/// One immediate child of a listed directory.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_dir: bool,
    /// Link target, filled in by the handler that knows the URL space.
    pub path: String,
    /// Display position, starting at 1.
    pub index: usize,
    pub modified: Option<DateTime<Local>>,
}

#[derive(Error, Debug)]
pub enum ListError {
    #[error("path does not exist")]
    NotFound,

    #[error("path is not a directory")]
    NotADirectory,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Read the immediate entries of `path` in the filesystem's own order.
///
/// A missing path and a non-directory path are reported as distinct errors;
/// an empty directory is an empty vector.
pub fn list_dir(path: &Path) -> Result<Vec<DirectoryEntry>, ListError> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ListError::NotFound,
        _ => ListError::Io(e),
    })?;

    if !metadata.is_dir() {
        return Err(ListError::NotADirectory);
    }

    let mut entries = Vec::new();

    for (i, entry) in std::fs::read_dir(path)?.enumerate() {
        let entry = entry?;
        // metadata() follows symlinks so a link to a directory lists as one
        let metadata = std::fs::metadata(entry.path()).or_else(|_| entry.metadata())?;

        entries.push(DirectoryEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            is_dir: metadata.is_dir(),
            path: String::new(),
            index: i + 1,
            modified: metadata.modified().ok().map(DateTime::<Local>::from),
        });
    }

    Ok(entries)
}

/// Directories first, then case-insensitive by name; renumbers `index`.
pub fn sort_for_display(entries: &mut [DirectoryEntry]) {
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => std::cmp::Ordering::Less,
        (false, true) => std::cmp::Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    });

    for (i, entry) in entries.iter_mut().enumerate() {
        entry.index = i + 1;
    }
}
