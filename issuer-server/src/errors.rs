use crate::api::models::ErrorResponse;
use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use issuer_engine::{AppAuthError, ExchangeError, IdentityError, PolicyError, ScopeError};
use serde_json::{json, Value};

/// A request failure as returned to the caller
#[derive(Debug, Clone)]
pub struct ApiError {
    pub message: String,
    pub status_code: StatusCode,
    pub details: Option<Value>,
}

impl ApiError {
    /// Create a new ApiError with a message and status code
    pub fn new<S: ToString>(message: S, status_code: StatusCode) -> Self {
        Self {
            message: message.to_string(),
            status_code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_request<S: ToString>(message: S) -> Self {
        Self::new(message, StatusCode::BAD_REQUEST)
    }

    pub fn unauthorized<S: ToString>(message: S) -> Self {
        Self::new(message, StatusCode::UNAUTHORIZED)
    }

    pub fn forbidden<S: ToString>(message: S) -> Self {
        Self::new(message, StatusCode::FORBIDDEN)
    }

    /// Create new Internal Server Error (500) with a message
    pub fn internal<S: ToString>(message: S) -> Self {
        Self::new(message, StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn service_unavailable<S: ToString>(message: S) -> Self {
        Self::new(message, StatusCode::SERVICE_UNAVAILABLE)
    }

    pub fn not_found() -> Self {
        Self::new("not found", StatusCode::NOT_FOUND)
    }

    pub fn method_not_allowed() -> Self {
        Self::new("method not allowed", StatusCode::METHOD_NOT_ALLOWED)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorResponse {
            error: self.message,
            details: self.details,
        };
        (self.status_code, Json(body)).into_response()
    }
}

impl From<ScopeError> for ApiError {
    fn from(err: ScopeError) -> Self {
        Self::bad_request(err)
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::OwnerNotAllowed(_) => Self::forbidden(err),
            _ => Self::bad_request(err),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        Self::unauthorized(format!("invalid OIDC token: {}", err))
    }
}

impl From<AppAuthError> for ApiError {
    fn from(err: AppAuthError) -> Self {
        Self::internal(err)
    }
}

impl From<ExchangeError> for ApiError {
    fn from(err: ExchangeError) -> Self {
        match &err {
            ExchangeError::AuthorityUnavailable(_) => Self::service_unavailable(&err),
            ExchangeError::IntegrationNotInstalled(_) | ExchangeError::InstallationSuspended(_) => {
                Self::forbidden(&err)
            }
            ExchangeError::InsufficientPermissions {
                requested,
                granted,
                missing,
            } => Self::forbidden(&err).with_details(json!({
                "requested": requested,
                "granted": granted,
                "missing": missing,
            })),
            ExchangeError::GrantMismatch { requested, issued } => {
                Self::forbidden(&err).with_details(json!({
                    "requested": requested,
                    "issued": issued,
                }))
            }
        }
    }
}
