//! HTML pages.
//!
//! Templates live in `templates/` and are compiled into the binary, so the
//! set of views is fixed and needs no runtime cache.

use askama::Template;
use chrono::{Datelike, Local};

use crate::error::BrowseError;
use crate::listing::DirectoryEntry;

/// The pages this server can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Completed archives and other files in the target root.
    Home,
    /// One directory of the source root.
    Files,
}

/// Entry as shown on a page.
pub struct EntryView {
    pub index: usize,
    pub name: String,
    /// Percent-encoded link.
    pub href: String,
    /// Unencoded path, posted back when asking for an archive.
    pub target: String,
    pub is_dir: bool,
    pub modified: Option<String>,
}

impl From<&DirectoryEntry> for EntryView {
    fn from(entry: &DirectoryEntry) -> Self {
        Self {
            index: entry.index,
            name: entry.name.clone(),
            href: crate::paths::encode_link(&entry.path),
            target: entry.path.clone(),
            is_dir: entry.is_dir,
            modified: entry
                .modified
                .map(|t| t.format("%d %b %Y at %H:%M").to_string()),
        }
    }
}

#[derive(Template)]
#[template(path = "home.html")]
struct HomePage<'a> {
    entries: &'a [EntryView],
    year: i32,
}

#[derive(Template)]
#[template(path = "files.html")]
struct FilesPage<'a> {
    title: &'a str,
    parent: Option<&'a str>,
    action: &'a str,
    entries: &'a [EntryView],
    year: i32,
}

/// Data a page is rendered from.
pub struct Page<'a> {
    /// Directory being shown, relative to its root (empty for the root).
    pub location: &'a str,
    pub entries: &'a [DirectoryEntry],
}

/// Link to the listing one level above `location`, if there is one.
fn parent_link(location: &str) -> Option<String> {
    let location = location.trim_matches('/');
    if location.is_empty() {
        return None;
    }

    let parent = location.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
    Some(format!("/files/{}", crate::paths::encode_link(parent)))
}

/// Render `view` for `page`.
pub fn render(view: View, page: &Page<'_>) -> Result<String, BrowseError> {
    let entries: Vec<EntryView> = page.entries.iter().map(EntryView::from).collect();
    let year = Local::now().year();

    let html = match view {
        View::Home => HomePage {
            entries: &entries,
            year,
        }
        .render()?,
        View::Files => {
            let location = page.location.trim_matches('/');
            let title = format!("/{}", location);
            let parent = parent_link(location);
            let action = format!("/files/{}", crate::paths::encode_link(location));

            FilesPage {
                title: &title,
                parent: parent.as_deref(),
                action: &action,
                entries: &entries,
                year,
            }
            .render()?
        }
    };

    Ok(html)
}
