pub(crate) mod health;
pub(crate) mod models;
pub(crate) mod token;

use crate::errors::ApiError;
use crate::state::AppState;
use axum::{routing::post, Router};

/// Combines all API routes into a single router
pub(super) fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .route(
            "/token",
            post(token::issue_token).fallback(method_not_allowed),
        )
        .fallback(not_found)
}

pub(crate) async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}

async fn not_found() -> ApiError {
    ApiError::not_found()
}
