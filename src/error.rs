use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::listing::ListError;

#[derive(Error, Debug)]
pub enum BrowseError {
    #[error("Path is outside its root directory")]
    InvalidPath,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Path is not a directory: {0}")]
    NotADirectory(String),

    #[error("Path is not a file: {0}")]
    NotAFile(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Archive failed: {0}")]
    ArchiveFailed(String),

    #[error("Missing or invalid credentials")]
    Unauthorized { realm: String },

    #[error("Template rendering failed: {0}")]
    Render(#[from] askama::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowseError {
    /// Convert a lister error, naming the request-relative path instead of
    /// the absolute one.
    pub fn from_list(err: ListError, requested: &str) -> Self {
        match err {
            ListError::NotFound => BrowseError::NotFound(requested.to_string()),
            ListError::NotADirectory => BrowseError::NotADirectory(requested.to_string()),
            ListError::Io(e) => BrowseError::Io(e),
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            // Escapes look exactly like missing files from the outside.
            BrowseError::InvalidPath => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            BrowseError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            BrowseError::NotADirectory(_) => (StatusCode::BAD_REQUEST, "NOT_A_DIRECTORY"),
            BrowseError::NotAFile(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            BrowseError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            BrowseError::ArchiveFailed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "ARCHIVE_FAILED")
            }
            BrowseError::Unauthorized { .. } => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            BrowseError::Render(_) => (StatusCode::INTERNAL_SERVER_ERROR, "RENDER_ERROR"),
            BrowseError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }

    /// Message sent to the client. Never carries paths or OS error text.
    fn public_message(&self) -> &'static str {
        match self {
            BrowseError::InvalidPath | BrowseError::NotFound(_) | BrowseError::NotAFile(_) => {
                "not found"
            }
            BrowseError::NotADirectory(_) => "not a directory",
            BrowseError::BadRequest(_) => "bad request",
            BrowseError::Unauthorized { .. } => "you are not allowed",
            BrowseError::ArchiveFailed(_) => "internal server error: the directory was not zipped",
            BrowseError::Render(_) | BrowseError::Io(_) => "internal server error",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    code: &'static str,
}

impl IntoResponse for BrowseError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            error!("{}", self);
        }

        let body = ErrorResponse {
            error: self.public_message(),
            code,
        };

        let mut response = (status, Json(body)).into_response();

        if let BrowseError::Unauthorized { realm } = &self {
            let challenge = format!("Basic realm=\"{}\"", realm.replace('"', "'"));
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, value);
            }
        }

        response
    }
}
