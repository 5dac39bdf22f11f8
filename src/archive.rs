//! On-demand zip archives of source subdirectories.
//!
//! The archive is produced in a single pass: every chunk the zip writer emits
//! goes through a [`FanOutWriter`] into both the HTTP response and the
//! persisted copy under the target root. Nothing is buffered in full, so a
//! failure part way through leaves a truncated file behind.

use std::fmt::Display;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use axum::body::Body;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::BrowseError;
use crate::paths::{relative_to, resolve_and_verify_path, resolve_path, sanitize_filename};

/// Size of the chunks handed to the response stream.
const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks in flight between the archive task and the response.
const CHANNEL_DEPTH: usize = 8;

/// Writes every chunk to both sinks; fails as soon as either one does.
pub struct FanOutWriter<A, B> {
    primary: A,
    secondary: B,
}

impl<A: Write, B: Write> FanOutWriter<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }

    pub fn into_inner(self) -> (A, B) {
        (self.primary, self.secondary)
    }
}

impl<A: Write, B: Write> Write for FanOutWriter<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.primary.write_all(buf)?;
        self.secondary.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.primary.flush()?;
        self.secondary.flush()
    }
}

/// Blocking writer that forwards chunks to an async response body.
///
/// Must only be used off the async runtime (e.g. inside `spawn_blocking`).
pub struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<io::Result<Bytes>>) -> Self {
        Self { tx }
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))?;

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Counts reported once an archive is complete.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub bytes: u64,
}

/// A started archive: the name it is persisted under and the response body.
pub struct ArchiveStream {
    pub file_name: String,
    pub body: Body,
}

/// File name of the persisted archive for `dir`, taken from its last
/// component as requested (a symlinked directory keeps the link's name).
pub fn archive_name(dir: &Path) -> String {
    let base = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .and_then(|n| sanitize_filename(&n))
        .unwrap_or_else(|| "archive".to_string());

    format!("{}.zip", base)
}

fn failed(context: &str, path: &Path, err: impl Display) -> BrowseError {
    BrowseError::ArchiveFailed(format!("{} {}: {}", context, path.display(), err))
}

/// Whether a walk entry may be descended into or archived. Only symlinks
/// need checking: everything else below a confined directory is confined.
fn stays_confined(canonical_root: &Path, entry: &walkdir::DirEntry) -> bool {
    if !entry.path_is_symlink() {
        return true;
    }

    match entry.path().canonicalize() {
        Ok(target) if target.starts_with(canonical_root) => true,
        Ok(target) => {
            warn!(
                "Skipping symlink {:?} pointing outside the source root ({:?})",
                entry.path(),
                target
            );
            false
        }
        Err(e) => {
            warn!("Skipping unresolvable symlink {:?}: {}", entry.path(), e);
            false
        }
    }
}

/// Whether a walk entry is the excluded directory (the target root when it
/// sits inside the source tree).
fn is_excluded(excluded: Option<&Path>, entry: &walkdir::DirEntry) -> bool {
    let Some(excluded) = excluded else {
        return false;
    };
    if !entry.file_type().is_dir() {
        return false;
    }

    let skip = entry
        .path()
        .canonicalize()
        .map(|canonical| canonical == excluded)
        .unwrap_or(false);
    if skip {
        debug!("Not archiving the target directory {:?}", entry.path());
    }
    skip
}

/// Write a zip of every regular file below `dir` into `sink`.
///
/// Entry names are `/`-separated paths relative to `dir`; directories add no
/// entries of their own. Symlinks are followed unless they lead outside
/// `source_root`. The canonical directory `excluded` is pruned from the walk.
/// Files that vanish during the walk are skipped; any other I/O error aborts
/// the archive.
pub fn write_archive<W: Write>(
    source_root: &Path,
    dir: &Path,
    excluded: Option<&Path>,
    mut sink: W,
) -> Result<ArchiveSummary, BrowseError> {
    let canonical_root = source_root
        .canonicalize()
        .map_err(|e| failed("resolving", source_root, e))?;

    let mut zip = ZipWriter::new_stream(&mut sink);
    let mut summary = ArchiveSummary::default();

    let walker = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| {
            stays_confined(&canonical_root, entry) && !is_excluded(excluded, entry)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().map(|io| io.kind()) == Some(io::ErrorKind::NotFound) => {
                warn!("Skipping vanished path {:?}: {}", e.path(), e);
                continue;
            }
            Err(e) => {
                let path = e.path().unwrap_or(dir).to_path_buf();
                return Err(failed("walking", &path, e));
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let entry_path = entry.path();
        let relative = relative_to(dir, entry_path);
        debug!("Adding {:?} as {}", entry_path, relative);

        let mut input =
            std::fs::File::open(entry_path).map_err(|e| failed("opening", entry_path, e))?;
        let size = input
            .metadata()
            .map_err(|e| failed("reading metadata of", entry_path, e))?
            .len();

        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644)
            .large_file(size >= u64::from(u32::MAX));

        zip.start_file(relative.as_str(), options)
            .map_err(|e| failed("starting entry for", entry_path, e))?;
        let copied = io::copy(&mut input, &mut zip).map_err(|e| failed("copying", entry_path, e))?;

        summary.entries += 1;
        summary.bytes += copied;
    }

    zip.finish().map_err(|e| failed("finishing archive of", dir, e))?;
    sink.flush().map_err(|e| failed("flushing archive of", dir, e))?;

    Ok(summary)
}

/// Resolve `requested` under `source_root` and start streaming its archive.
///
/// The target root is left out of the archive, so archiving a directory
/// that contains it never picks up the file being written or older archives.
///
/// Errors that happen before the first byte (bad path, missing directory,
/// unwritable target) are returned directly. Once streaming has started, a
/// failure is logged and terminates the response body with an error.
pub async fn build_archive(
    source_root: &Path,
    target_root: &Path,
    requested: &str,
) -> Result<ArchiveStream, BrowseError> {
    let dir = resolve_and_verify_path(source_root, requested)?;

    let metadata = match tokio::fs::metadata(&dir).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(BrowseError::NotFound(requested.to_string()));
        }
        Err(e) => return Err(BrowseError::Io(e)),
    };

    if !metadata.is_dir() {
        return Err(BrowseError::NotADirectory(requested.to_string()));
    }

    let file_name = archive_name(&resolve_path(source_root, requested)?);
    let canonical_target = target_root
        .canonicalize()
        .map_err(|e| failed("resolving", target_root, e))?;
    let destination = canonical_target.join(&file_name);

    let file = tokio::fs::File::create(&destination)
        .await
        .map_err(|e| failed("creating", &destination, e))?
        .into_std()
        .await;

    info!("Archiving {} into {}", dir.display(), destination.display());

    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let error_tx = tx.clone();
    let source_root = source_root.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let sink = FanOutWriter::new(
            BufWriter::with_capacity(CHUNK_SIZE, ChannelWriter::new(tx)),
            BufWriter::with_capacity(CHUNK_SIZE, file),
        );

        match write_archive(&source_root, &dir, Some(&canonical_target), sink) {
            Ok(summary) => info!(
                "Archived {} ({} files, {} bytes) into {}",
                dir.display(),
                summary.entries,
                summary.bytes,
                destination.display()
            ),
            Err(err) => {
                error!(
                    "{}; {} may be left truncated",
                    err,
                    destination.display()
                );
                let _ = error_tx.blocking_send(Err(io::Error::new(
                    io::ErrorKind::Other,
                    "archive aborted",
                )));
            }
        }
    });

    Ok(ArchiveStream {
        file_name,
        body: Body::from_stream(ReceiverStream::new(rx)),
    })
}
