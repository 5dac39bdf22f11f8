//! Router-level tests: authentication, browsing, archiving and downloads.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use tower::ServiceExt;

mod common;
use common::{basic_auth, test_app, test_app_with_target_in_source, valid_auth};

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(Method::GET)
        .header(header::AUTHORIZATION, valid_auth())
        .body(Body::empty())
        .unwrap()
}

fn post_archive(uri: &str, field: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method(Method::POST)
        .header(header::AUTHORIZATION, valid_auth())
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("zip={}", urlencoding::encode(field))))
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 64 * 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

fn zip_entries(bytes: &[u8]) -> HashMap<String, Vec<u8>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut entries = HashMap::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).unwrap();
        let mut content = Vec::new();
        file.read_to_end(&mut content).unwrap();
        entries.insert(file.name().to_string(), content);
    }
    entries
}

// ============================================================================
// Access gate
// ============================================================================

/// Every route, known or not, answers 401 with a challenge when no
/// credentials are sent.
#[tokio::test]
async fn test_every_route_requires_credentials() {
    let app = test_app();

    let requests = [
        (Method::GET, "/"),
        (Method::GET, "/files/"),
        (Method::GET, "/files/docs"),
        (Method::GET, "/files/readme.md"),
        (Method::POST, "/files/"),
        (Method::GET, "/download/docs.zip"),
        (Method::GET, "/does-not-exist"),
    ];

    for (method, uri) in requests {
        let response = send(
            &app.router,
            Request::builder()
                .uri(uri)
                .method(method.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Basic realm=\"restricted\""
        );
    }

    // Nothing was archived on the way.
    assert_eq!(std::fs::read_dir(app.target.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let app = test_app();

    let response = send(
        &app.router,
        Request::builder()
            .uri("/files/")
            .header(header::AUTHORIZATION, basic_auth(common::USERNAME, "wrong"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
}

#[tokio::test]
async fn test_malformed_authorization_is_rejected() {
    let app = test_app();

    let response = send(
        &app.router,
        Request::builder()
            .uri("/")
            .header(header::AUTHORIZATION, "Basic not-base64!!")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Browsing
// ============================================================================

#[tokio::test]
async fn test_list_source_root() {
    let app = test_app();

    let response = send(&app.router, get("/files/")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let html = body_text(response).await;
    assert!(html.contains("href=\"/files/docs\""));
    assert!(html.contains("href=\"/files/empty\""));
    assert!(html.contains("href=\"/files/readme.md\""));
    assert!(html.contains("name=\"zip\""));
}

#[tokio::test]
async fn test_list_nested_directory() {
    let app = test_app();

    let response = send(&app.router, get("/files/docs/sub")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let html = body_text(response).await;
    assert!(html.contains("href=\"/files/docs/sub/c.txt\""));
    assert!(html.contains("href=\"/files/docs\""));
}

#[tokio::test]
async fn test_list_empty_directory() {
    let app = test_app();

    let response = send(&app.router, get("/files/empty")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("empty"));
}

#[tokio::test]
async fn test_listing_a_file_serves_it() {
    let app = test_app();

    let response = send(&app.router, get("/files/docs/a.txt")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain"
    );
    assert_eq!(body_bytes(response).await, b"alpha");
}

#[tokio::test]
async fn test_missing_path_is_not_found_without_leaking_paths() {
    let app = test_app();

    let response = send(&app.router, get("/files/docs/missing.txt")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_text(response).await;
    let source = app.source.path().canonicalize().unwrap();
    assert!(!body.contains(&*source.to_string_lossy()));
    assert!(!body.contains("missing.txt"));
}

#[tokio::test]
async fn test_traversal_is_not_found() {
    let app = test_app();
    std::fs::write(app.target.path().join("outside.txt"), "outside").unwrap();

    for uri in [
        "/files/../outside.txt",
        "/files/%2e%2e/outside.txt",
        "/files/docs/%2e%2e/%2e%2e/outside.txt",
        "/download/%2e%2e/outside.txt",
    ] {
        let response = send(&app.router, get(uri)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[cfg(unix)]
#[tokio::test]
async fn test_file_with_control_character_in_name_is_served() {
    let app = test_app();
    std::fs::write(app.source.path().join("bad\nname.txt"), "odd").unwrap();

    let response = send(&app.router, get("/files/bad%0Aname.txt")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "inline; filename=\"badname.txt\""
    );
    assert_eq!(body_bytes(response).await, b"odd");
}

#[cfg(unix)]
#[tokio::test]
async fn test_missing_path_below_escaping_symlink_is_not_found() {
    use std::os::unix::fs::symlink;

    let app = test_app();
    let outside = tempfile::TempDir::new().unwrap();
    symlink(outside.path(), app.source.path().join("escape")).unwrap();

    let response = send(&app.router, get("/files/escape/missing/x")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_out_of_source_is_not_found() {
    use std::os::unix::fs::symlink;

    let app = test_app();
    let outside = tempfile::TempDir::new().unwrap();
    std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
    symlink(outside.path(), app.source.path().join("escape")).unwrap();

    let response = send(&app.router, get("/files/escape/secret.txt")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Archives
// ============================================================================

#[tokio::test]
async fn test_archive_streams_zip_and_persists_copy() {
    let app = test_app();

    let response = send(&app.router, post_archive("/files/", "/files/docs")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/octet-stream"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"docs.zip\""
    );

    let streamed = body_bytes(response).await;
    let entries = zip_entries(&streamed);

    let expected: HashMap<String, Vec<u8>> = [
        ("a.txt", "alpha"),
        ("b.txt", "bravo"),
        ("sub/c.txt", "charlie"),
    ]
    .into_iter()
    .map(|(name, content)| (name.to_string(), content.as_bytes().to_vec()))
    .collect();
    assert_eq!(entries, expected);

    let persisted = std::fs::read(app.target.path().join("docs.zip")).unwrap();
    assert_eq!(persisted, streamed);
}

#[tokio::test]
async fn test_archive_name_comes_from_form_not_url() {
    let app = test_app();

    let response = send(&app.router, post_archive("/files/empty", "docs/sub")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let entries = zip_entries(&body_bytes(response).await);
    assert_eq!(entries.keys().collect::<Vec<_>>(), ["c.txt"]);
    assert!(app.target.path().join("sub.zip").exists());
    assert!(!app.target.path().join("empty.zip").exists());
}

#[tokio::test]
async fn test_rearchiving_overwrites_previous_copy() {
    let app = test_app();

    let first = send(&app.router, post_archive("/files/", "docs")).await;
    body_bytes(first).await;

    std::fs::remove_file(app.source.path().join("docs/b.txt")).unwrap();

    let second = send(&app.router, post_archive("/files/", "docs")).await;
    let streamed = body_bytes(second).await;

    let persisted = std::fs::read(app.target.path().join("docs.zip")).unwrap();
    assert_eq!(persisted, streamed);
    assert!(!zip_entries(&persisted).contains_key("b.txt"));
}

#[tokio::test]
async fn test_archive_leaves_out_target_inside_source() {
    let app = test_app_with_target_in_source();
    let target_name = app.target.path().file_name().unwrap().to_string_lossy().to_string();
    std::fs::write(app.target.path().join("old.zip"), "previous archive").unwrap();

    let response = send(&app.router, post_archive("/files/", "")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let streamed = body_bytes(response).await;
    let entries = zip_entries(&streamed);
    assert!(entries.contains_key("docs/a.txt"));
    assert!(entries.contains_key("readme.md"));
    assert!(
        entries.keys().all(|name| !name.starts_with(&format!("{}/", target_name))),
        "{:?}",
        entries.keys()
    );

    let archive_name = dirshare::archive::archive_name(&app.source.path().canonicalize().unwrap());
    let persisted = std::fs::read(app.target.path().join(archive_name)).unwrap();
    assert_eq!(persisted, streamed);
}

#[cfg(unix)]
#[tokio::test]
async fn test_archive_of_symlinked_directory_uses_link_name() {
    use std::os::unix::fs::symlink;

    let app = test_app();
    symlink(app.source.path().join("docs"), app.source.path().join("papers")).unwrap();

    let response = send(&app.router, post_archive("/files/", "papers")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"papers.zip\""
    );

    let streamed = body_bytes(response).await;
    assert_eq!(zip_entries(&streamed).len(), 3);
    assert!(app.target.path().join("papers.zip").exists());
    assert!(!app.target.path().join("docs.zip").exists());
}

#[tokio::test]
async fn test_archive_without_zip_field_is_bad_request() {
    let app = test_app();

    let response = send(
        &app.router,
        Request::builder()
            .uri("/files/")
            .method(Method::POST)
            .header(header::AUTHORIZATION, valid_auth())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("other=1"))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    let body = body_text(response).await;
    assert!(body.contains("\"code\":\"BAD_REQUEST\""), "{body}");
    assert_eq!(std::fs::read_dir(app.target.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_archive_rejects_bad_targets() {
    let app = test_app();

    let response = send(&app.router, post_archive("/files/", "../")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app.router, post_archive("/files/", "/files/nope")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app.router, post_archive("/files/", "readme.md")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(std::fs::read_dir(app.target.path()).unwrap().count(), 0);
}

// ============================================================================
// Home and downloads
// ============================================================================

#[tokio::test]
async fn test_home_lists_completed_archives() {
    let app = test_app();

    let response = send(&app.router, get("/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!body_text(response).await.contains("/download/"));

    let response = send(&app.router, post_archive("/files/", "docs")).await;
    body_bytes(response).await;

    let response = send(&app.router, get("/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("href=\"/download/docs.zip\""));
    assert!(html.contains(" at "));
}

#[tokio::test]
async fn test_download_serves_file_from_target() {
    let app = test_app();
    std::fs::write(app.target.path().join("notes.txt"), "downloaded").unwrap();

    let response = send(&app.router, get("/download/notes.txt")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"notes.txt\""
    );
    assert_eq!(body_bytes(response).await, b"downloaded");
}

#[tokio::test]
async fn test_download_missing_or_directory_is_not_found() {
    let app = test_app();
    std::fs::create_dir(app.target.path().join("folder")).unwrap();

    let response = send(&app.router, get("/download/nothing.zip")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app.router, get("/download/folder")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_unmatched_routes_and_methods_are_not_found() {
    let app = test_app();

    let response = send(&app.router, get("/nowhere")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(
        &app.router,
        Request::builder()
            .uri("/files/docs")
            .method(Method::DELETE)
            .header(header::AUTHORIZATION, valid_auth())
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.source.path().join("docs").exists());

    let response = send(
        &app.router,
        Request::builder()
            .uri("/download/x")
            .method(Method::POST)
            .header(header::AUTHORIZATION, valid_auth())
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
