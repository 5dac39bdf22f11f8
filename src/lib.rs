//! Password-protected directory browser.
//!
//! Lists directories under a source root, serves single files, and zips a
//! chosen subdirectory on demand. Each archive is streamed to the client
//! while a copy is kept under the target root, where it stays available for
//! download.

pub mod archive;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod listing;
pub mod paths;
pub mod routes;
pub mod views;

use std::path::PathBuf;
use std::sync::Arc;

pub use config::Config;
pub use error::BrowseError;
pub use routes::router;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Directory tree that can be browsed and archived
    pub source_root: PathBuf,
    /// Directory holding completed archives
    pub target_root: PathBuf,
    /// Configuration
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState with the given roots and config.
    pub fn with_config(source_root: PathBuf, target_root: PathBuf, config: Config) -> Self {
        Self {
            source_root,
            target_root,
            config: Arc::new(config),
        }
    }
}
