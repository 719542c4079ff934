use crate::api::method_not_allowed;
use crate::openapi::HEALTH_TAG;
use crate::state::AppState;
use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Basic health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Health {
    status: String,
}

/// Liveness probe. The service keeps no state, so being able to answer is
/// all there is to check.
#[utoipa::path(
    get,
    path = "/health",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Service is healthy", body = Health)
    )
)]
pub(crate) async fn health_check() -> Json<Health> {
    Json(Health {
        status: "ok".to_string(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check).fallback(method_not_allowed))
}
