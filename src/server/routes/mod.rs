//! HTTP route handlers.

pub mod auth;
pub mod health;
pub mod threads;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

use crate::auth::resolver;
use crate::core::entities::User;
use crate::core::errors::ServiceError;
use crate::server::error::ApiError;
use crate::server::state::AppState;

/// Extract the bearer token from the `Authorization` header, if present.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the calling owner or fail with 401.
pub(crate) async fn require_user(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<User, ApiError> {
    let token = bearer_token(headers)
        .ok_or(ServiceError::Unauthenticated("missing bearer token"))?;
    resolver::resolve_bearer(&state.store, &state.config.auth.token_secret, token)
        .await
        .map_err(ApiError::from)
}
