//! Shared-secret authentication for the streaming endpoint.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use constant_time_eq::constant_time_eq;
use tracing::warn;

use super::error::ApiError;
use super::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject the request unless `x-api-key` matches the configured key.
///
/// A no-op when no key is configured. Runs before the body is read, so a
/// rejected request never reaches the upstream.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.auth.required_key() else {
        return Ok(next.run(req).await);
    };
    if !key_matches(req.headers(), expected) {
        warn!(path = %req.uri().path(), "rejected request with missing or invalid api key");
        return Err(ApiError::unauthorized("Unauthorized"));
    }
    Ok(next.run(req).await)
}

fn key_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|provided| constant_time_eq(provided.as_bytes(), expected.as_bytes()))
}
