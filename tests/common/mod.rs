//! Test utilities and common setup.

use axum::Router;
use base64::Engine;
use tempfile::TempDir;

use dirshare::{AppState, Config};

pub const USERNAME: &str = "tester";
pub const PASSWORD: &str = "correct horse";

/// Source and target roots on disk plus the router serving them.
pub struct TestApp {
    pub source: TempDir,
    pub target: TempDir,
    pub router: Router,
}

/// Source tree used by most tests:
///
/// ```text
/// docs/a.txt
/// docs/b.txt
/// docs/sub/c.txt
/// empty/
/// readme.md
/// ```
fn populate_source(source: &TempDir) {
    let root = source.path();
    std::fs::create_dir_all(root.join("docs/sub")).unwrap();
    std::fs::create_dir_all(root.join("empty")).unwrap();
    std::fs::write(root.join("docs/a.txt"), "alpha").unwrap();
    std::fs::write(root.join("docs/b.txt"), "bravo").unwrap();
    std::fs::write(root.join("docs/sub/c.txt"), "charlie").unwrap();
    std::fs::write(root.join("readme.md"), "# readme").unwrap();
}

/// Create a test application with a populated source root.
pub fn test_app() -> TestApp {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();
    build_app(source, target)
}

/// Like [`test_app`], but the target root is a directory inside the source.
pub fn test_app_with_target_in_source() -> TestApp {
    let source = TempDir::new().unwrap();
    let target = TempDir::new_in(source.path()).unwrap();
    build_app(source, target)
}

fn build_app(source: TempDir, target: TempDir) -> TestApp {
    populate_source(&source);

    let config = Config::default().with_credential(USERNAME.into(), PASSWORD.into());
    let state = AppState::with_config(
        source.path().canonicalize().unwrap(),
        target.path().canonicalize().unwrap(),
        config,
    );

    TestApp {
        router: dirshare::router(state),
        source,
        target,
    }
}

/// `Authorization` header value for the given pair.
pub fn basic_auth(username: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", encoded)
}

/// `Authorization` header value for the configured test credential.
pub fn valid_auth() -> String {
    basic_auth(USERNAME, PASSWORD)
}
