use crate::api::health::Health;
use crate::api::models::{ErrorResponse, TokenResponse};
use utoipa::OpenApi;

pub(crate) const HEALTH_TAG: &str = "Health API";
pub(crate) const TOKEN_TAG: &str = "Token API";

#[derive(OpenApi)]
#[openapi(
    paths(crate::api::token::issue_token, crate::api::health::health_check),
    components(schemas(TokenResponse, ErrorResponse, Health)),
    tags(
        (name = TOKEN_TAG, description = "OIDC to installation token exchange"),
        (name = HEALTH_TAG, description = "Health check endpoints"),
    ),
    info(
        title = "GitHub Repository Token Issuer",
        description = "Exchanges GitHub Actions OIDC tokens for scoped GitHub App installation tokens",
        version = "0.1.0"
    )
)]
pub(crate) struct ApiDoc;
