//! HTTP Basic authentication gate.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Basic, Authorization},
    TypedHeader,
};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::config::Credential;
use crate::error::BrowseError;
use crate::AppState;

/// Compare one submitted pair against one configured pair without an early
/// exit on the first mismatching byte.
fn credential_matches(credential: &Credential, username: &str, password: &str) -> bool {
    let user_ok = credential.username.as_bytes().ct_eq(username.as_bytes());
    let pass_ok = credential.password.as_bytes().ct_eq(password.as_bytes());
    bool::from(user_ok & pass_ok)
}

/// Whether `username`/`password` matches any configured credential.
///
/// Every entry is compared, so the time taken does not reveal which one
/// matched.
pub fn is_authorized(credentials: &[Credential], username: &str, password: &str) -> bool {
    credentials
        .iter()
        .fold(false, |found, c| credential_matches(c, username, password) | found)
}

/// Middleware rejecting requests without valid Basic credentials.
///
/// Runs before routing, so unauthenticated requests never reach the
/// filesystem.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Basic>>>,
    request: Request,
    next: Next,
) -> Response {
    let unauthorized = || {
        BrowseError::Unauthorized {
            realm: state.config.realm.clone(),
        }
        .into_response()
    };

    let Some(TypedHeader(Authorization(basic))) = auth else {
        debug!("No basic credentials on {} {}", request.method(), request.uri().path());
        return unauthorized();
    };

    if !is_authorized(&state.config.credentials, basic.username(), basic.password()) {
        warn!(
            "Rejected credentials for user {:?} on {} {}",
            basic.username(),
            request.method(),
            request.uri().path()
        );
        return unauthorized();
    }

    next.run(request).await
}
