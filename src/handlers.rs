use std::path::{Path as FsPath, PathBuf};

use axum::{
    body::Body,
    extract::{rejection::FormRejection, Path, State},
    http::{header, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::archive::build_archive;
use crate::error::BrowseError;
use crate::listing::{list_dir, sort_for_display, DirectoryEntry, ListError};
use crate::paths::{resolve_and_verify_path, strip_route_prefix, DOWNLOAD_PREFIX, FILES_PREFIX};
use crate::views::{render, Page, View};
use crate::AppState;

/// Form posted by the "zip" buttons on a listing page.
#[derive(Debug, Deserialize)]
pub struct ArchiveForm {
    /// Directory to archive, with or without the `/files/` prefix
    pub zip: String,
}

#[derive(Debug, Clone, Copy)]
enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Disposition::Inline => "inline",
            Disposition::Attachment => "attachment",
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

async fn list_blocking(path: PathBuf) -> Result<Vec<DirectoryEntry>, ListError> {
    tokio::task::spawn_blocking(move || list_dir(&path))
        .await
        .map_err(|err| ListError::Io(std::io::Error::new(std::io::ErrorKind::Other, err)))?
}

fn link_under(prefix: &str, location: &str, name: &str) -> String {
    if location.is_empty() {
        format!("{}{}", prefix, name)
    } else {
        format!("{}{}/{}", prefix, location, name)
    }
}

/// File name as it may appear inside a quoted `Content-Disposition` value.
fn header_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control())
        .map(|c| if c == '"' { '\'' } else { c })
        .collect()
}

/// Stream a file with its guessed content type.
async fn serve_file(path: &FsPath, disposition: Disposition) -> Result<Response, BrowseError> {
    let file = fs::File::open(path).await?;
    let file_size = file.metadata().await?.len();

    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let safe_filename = header_filename(&file_name);

    debug!("Streaming file: {}", path.display());

    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime),
            (header::CONTENT_LENGTH, file_size.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("{}; filename=\"{}\"", disposition.as_str(), safe_filename),
            ),
        ],
        body,
    )
        .into_response())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET / - List the target root
pub async fn home(State(state): State<AppState>) -> Result<Html<String>, BrowseError> {
    let entries = list_blocking(state.target_root.clone())
        .await
        .map_err(|e| BrowseError::from_list(e, "/"))?;

    let mut files: Vec<DirectoryEntry> = entries
        .into_iter()
        .filter(|entry| !entry.is_dir)
        .map(|mut entry| {
            entry.path = link_under(DOWNLOAD_PREFIX, "", &entry.name);
            entry
        })
        .collect();
    sort_for_display(&mut files);

    let html = render(
        View::Home,
        &Page {
            location: "",
            entries: &files,
        },
    )?;

    Ok(Html(html))
}

/// GET /files/ - List the source root
pub async fn list_root(State(state): State<AppState>) -> Result<Response, BrowseError> {
    browse(&state, "").await
}

/// GET /files/*path - List a directory, or serve the file if it is not one
pub async fn list_path(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Result<Response, BrowseError> {
    browse(&state, &path).await
}

async fn browse(state: &AppState, requested: &str) -> Result<Response, BrowseError> {
    let path = resolve_and_verify_path(&state.source_root, requested)?;

    let mut entries = match list_blocking(path.clone()).await {
        Ok(entries) => entries,
        Err(ListError::NotADirectory) => {
            return serve_file(&path, Disposition::Inline).await;
        }
        Err(err) => return Err(BrowseError::from_list(err, requested)),
    };

    let location = requested.trim_matches('/');
    debug!("Listing {} ({} entries)", path.display(), entries.len());

    for entry in entries.iter_mut() {
        entry.path = link_under(FILES_PREFIX, location, &entry.name);
    }
    sort_for_display(&mut entries);

    let html = render(
        View::Files,
        &Page {
            location,
            entries: &entries,
        },
    )?;

    Ok(Html(html).into_response())
}

/// POST /files/*path - Zip the directory named by the `zip` form field
///
/// The archive is streamed to the client and written to the target root at
/// the same time.
pub async fn create_archive(
    State(state): State<AppState>,
    form: Result<Form<ArchiveForm>, FormRejection>,
) -> Result<Response, BrowseError> {
    let Form(form) = form.map_err(|rejection| {
        debug!("Rejected archive form: {}", rejection);
        BrowseError::BadRequest(rejection.body_text())
    })?;
    let requested = strip_route_prefix(&form.zip, FILES_PREFIX);
    debug!("Archive requested for {:?}", requested);

    let archive = build_archive(&state.source_root, &state.target_root, requested).await?;
    let safe_name = header_filename(&archive.file_name);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", safe_name),
            ),
        ],
        archive.body,
    )
        .into_response())
}

/// GET /download/*name - Serve a file from the target root
pub async fn download(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, BrowseError> {
    let path = resolve_and_verify_path(&state.target_root, &name)?;

    let metadata = match fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(BrowseError::NotFound(name));
        }
        Err(e) => return Err(BrowseError::Io(e)),
    };

    if metadata.is_dir() {
        return Err(BrowseError::NotAFile(name));
    }

    info!("Download of {}", path.display());
    serve_file(&path, Disposition::Attachment).await
}

/// Anything without a route, or with a method the route does not accept
pub async fn not_found(uri: Uri) -> BrowseError {
    debug!("No route for {}", uri.path());
    BrowseError::NotFound(uri.path().to_string())
}
