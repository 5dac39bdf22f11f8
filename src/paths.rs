//! Mapping of URL fragments onto paths under the source and target roots.
//!
//! Every path that reaches the filesystem goes through
//! [`resolve_and_verify_path`], and the same rule holds for both roots:
//!
//! - `..`, absolute and drive-prefix components are refused, never normalized;
//! - each existing component, symlinks included, must canonicalize to a path
//!   under the canonical root;
//! - a missing path is accepted as built once its nearest existing ancestor
//!   has passed the check above.
//!
//! Refusals surface as [`BrowseError::InvalidPath`], which answers 404 just
//! like a missing file.

use std::path::{Component, Path, PathBuf};

use tracing::{error, warn};

use crate::error::BrowseError;

/// Route prefix for browsing the source root.
pub const FILES_PREFIX: &str = "/files/";

/// Route prefix for downloads from the target root.
pub const DOWNLOAD_PREFIX: &str = "/download/";

/// Strip a known route prefix from a URL path or form value.
///
/// Values without the prefix are returned unchanged, so both `/files/docs`
/// and `docs` name the same directory.
pub fn strip_route_prefix<'a>(value: &'a str, prefix: &str) -> &'a str {
    value.strip_prefix(prefix).unwrap_or(value)
}

/// Join a relative fragment onto `root` without touching the filesystem.
///
/// Parent (`..`), root and prefix components are rejected outright rather
/// than normalized, as are components containing NUL bytes. A single leading
/// slash is accepted and ignored.
pub fn resolve_path(root: &Path, relative: &str) -> Result<PathBuf, BrowseError> {
    let relative = relative.trim_start_matches('/');

    if relative.is_empty() || relative == "." {
        return Ok(root.to_path_buf());
    }

    let mut result = root.to_path_buf();

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(name) => {
                if name.to_string_lossy().contains('\0') {
                    warn!("Path component contains null byte: {:?}", name);
                    return Err(BrowseError::InvalidPath);
                }
                result.push(name);
            }
            Component::ParentDir => {
                warn!("Path traversal attempt detected: parent directory (..) in path");
                return Err(BrowseError::InvalidPath);
            }
            Component::CurDir => continue,
            Component::RootDir | Component::Prefix(_) => {
                warn!("Absolute path component in relative path");
                return Err(BrowseError::InvalidPath);
            }
        }
    }

    if !result.starts_with(root) {
        error!("Path resolution left the root: {:?}", result);
        return Err(BrowseError::InvalidPath);
    }

    Ok(result)
}

/// Resolve a fragment the way [`resolve_path`] does, then confine it on disk.
///
/// The built path is checked one component at a time, starting at the root.
/// Every component that exists is canonicalized and must land under the
/// canonical root, so a symlink pointing elsewhere fails before anything
/// beneath it is looked at. Dangling symlinks are rejected as well. The first
/// missing component ends the walk: the path is returned as built and the
/// caller sees `NotFound` when it opens it.
///
/// An existing path is returned in canonical form.
pub fn resolve_and_verify_path(root: &Path, relative: &str) -> Result<PathBuf, BrowseError> {
    let built_path = resolve_path(root, relative)?;
    let canonical_root = root.canonicalize()?;

    let mut ancestors: Vec<&Path> = built_path
        .ancestors()
        .skip(1)
        .take_while(|ancestor| ancestor.starts_with(root))
        .collect();
    ancestors.reverse();

    let mut missing = false;
    for ancestor in ancestors {
        if ancestor.symlink_metadata().is_err() {
            missing = true;
            break;
        }
        ensure_confined(&canonical_root, ancestor)?;
    }

    // symlink_metadata so that dangling links still count as existing
    if missing || built_path.symlink_metadata().is_err() {
        return Ok(built_path);
    }
    ensure_confined(&canonical_root, &built_path)
}

/// Canonicalize an existing `path` and fail with `InvalidPath` unless it is
/// `canonical_root` or lies below it.
fn ensure_confined(canonical_root: &Path, path: &Path) -> Result<PathBuf, BrowseError> {
    let canonical_path = match path.canonicalize() {
        Ok(canonical_path) => canonical_path,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Dangling symlink: {:?}", path);
            return Err(BrowseError::InvalidPath);
        }
        Err(e) => return Err(BrowseError::Io(e)),
    };

    if !canonical_path.starts_with(canonical_root) {
        warn!(
            "Symlink escape attempt: {:?} resolved to {:?} which is outside {:?}",
            path, canonical_path, canonical_root
        );
        return Err(BrowseError::InvalidPath);
    }

    Ok(canonical_path)
}

/// `/`-separated path of `full_path` relative to `root`, or an empty string
/// when `full_path` is not under `root`.
pub fn relative_to(root: &Path, full_path: &Path) -> String {
    full_path
        .strip_prefix(root)
        .map(|p| {
            p.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

/// Percent-encode each segment of a `/`-separated path for use in a link.
pub fn encode_link(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Sanitize a file name by removing dangerous characters and separators.
/// Returns `None` if nothing usable remains.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();

    let sanitized = sanitized.trim_matches(|c| c == '.' || c == ' ');

    if sanitized.is_empty() {
        return None;
    }

    let upper = sanitized.to_uppercase();
    let reserved = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
        "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    if reserved
        .iter()
        .any(|r| upper == *r || upper.starts_with(&format!("{}.", r)))
    {
        return None;
    }

    // Leave room for the ".zip" suffix within the usual 255 byte limit.
    let mut end = sanitized.len().min(250);
    while !sanitized.is_char_boundary(end) {
        end -= 1;
    }

    Some(sanitized[..end].to_string())
}
