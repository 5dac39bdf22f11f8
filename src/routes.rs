use axum::{middleware, routing::get, Router};

use crate::auth;
use crate::handlers;
use crate::AppState;

/// Create the browsing, archive and download routes
pub fn browse_routes() -> Router<AppState> {
    Router::new()
        // Completed archives
        .route("/", get(handlers::home).fallback(handlers::not_found))
        // Source tree; POST builds an archive
        .route(
            "/files/",
            get(handlers::list_root)
                .post(handlers::create_archive)
                .fallback(handlers::not_found),
        )
        .route(
            "/files/*path",
            get(handlers::list_path)
                .post(handlers::create_archive)
                .fallback(handlers::not_found),
        )
        // Files in the target root
        .route(
            "/download/*name",
            get(handlers::download).fallback(handlers::not_found),
        )
        .fallback(handlers::not_found)
}

/// Full application router with the basic-auth gate in front of every route
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(browse_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_basic_auth,
        ))
        .with_state(state)
}
