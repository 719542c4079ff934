use crate::api::models::{ErrorResponse, TokenResponse};
use crate::errors::ApiError;
use crate::openapi::TOKEN_TAG;
use crate::state::AppState;
use axum::extract::{RawQuery, State};
use axum::Json;
use chrono::SecondsFormat;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use issuer_engine::{exchange, ScopeRequest};
use log::{error, info, warn};

/// Extracts the assertion from an `Authorization: Bearer <token>` header.
/// The scheme is matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = match headers.get(AUTHORIZATION) {
        Some(value) if !value.is_empty() => value,
        _ => return Err(ApiError::unauthorized("missing Authorization header")),
    };

    let invalid_format = || {
        ApiError::unauthorized("invalid Authorization header format (expected 'Bearer <token>')")
    };
    let value = value.to_str().map_err(|_| invalid_format())?;
    let (scheme, token) = value.split_once(' ').ok_or_else(invalid_format)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(invalid_format());
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized("empty token in Authorization header"));
    }
    Ok(token)
}

/// Exchange a GitHub Actions OIDC token for a scoped installation token
///
/// Every query parameter names a scope and its value the requested access
/// level, e.g. `POST /token?contents=write&issues=read`.
#[utoipa::path(
    post,
    path = "/token",
    tag = TOKEN_TAG,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Malformed or disallowed scope request", body = ErrorResponse),
        (status = 401, description = "Missing or invalid OIDC token", body = ErrorResponse),
        (status = 403, description = "Owner not allowed, app not installed or insufficient permissions", body = ErrorResponse),
        (status = 500, description = "Signing key or JWT failure", body = ErrorResponse),
        (status = 503, description = "GitHub API unavailable", body = ErrorResponse),
    )
)]
pub(crate) async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Json<TokenResponse>, ApiError> {
    process_token_request(&state, &headers, query.as_deref())
        .await
        .map(Json)
        .inspect_err(|err| {
            if err.status_code.is_server_error() {
                error!("Token request failed ({}): {}", err.status_code, err.message);
            } else {
                warn!("Token request rejected ({}): {}", err.status_code, err.message);
            }
        })
}

async fn process_token_request(
    state: &AppState,
    headers: &HeaderMap,
    query: Option<&str>,
) -> Result<TokenResponse, ApiError> {
    let assertion = bearer_token(headers)?;
    let subject = state.identity.verify(assertion).await?;

    let scopes = ScopeRequest::from_query(query)?;
    state.allowed_owners.check(&subject)?;
    state.policy.validate(&scopes)?;

    let authority = state.github.authenticate().await?;
    let credential = exchange(&authority, &subject, &scopes, state.request_timeout).await?;

    info!(
        "Issued token for {} with scopes {:?}, expires at {}",
        subject,
        scopes.as_map(),
        credential.expires_at
    );

    Ok(TokenResponse {
        token: credential.token,
        expires_at: credential
            .expires_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        scopes: scopes
            .iter()
            .map(|(scope, level)| (scope.clone(), level.to_string()))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestFixture, JWKS_PATH};
    use http::{Method, StatusCode};
    use serde_json::json;
    use wiremock::matchers::{any, body_json, method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(&headers("bearer abc")).unwrap(), "abc");
        assert_eq!(bearer_token(&headers("BEARER abc")).unwrap(), "abc");

        let missing = bearer_token(&HeaderMap::new()).unwrap_err();
        assert_eq!(missing.message, "missing Authorization header");

        for value in ["Basic abc", "Bearerabc", "Token abc"] {
            let err = bearer_token(&headers(value)).unwrap_err();
            assert_eq!(err.status_code, StatusCode::UNAUTHORIZED);
            assert!(err.message.starts_with("invalid Authorization header format"));
        }

        let empty = bearer_token(&headers("Bearer    ")).unwrap_err();
        assert_eq!(empty.message, "empty token in Authorization header");
    }

    async fn mount_installation(fixture: &TestFixture) {
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/installation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42})))
            .expect(1)
            .mount(&fixture.github)
            .await;
    }

    async fn mount_permissions(fixture: &TestFixture, permissions: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/app/installations/42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": 42, "permissions": permissions})),
            )
            .expect(1)
            .mount(&fixture.github)
            .await;
    }

    async fn mount_access_token(
        fixture: &TestFixture,
        requested: serde_json::Value,
        issued: serde_json::Value,
    ) {
        Mock::given(method("POST"))
            .and(path("/app/installations/42/access_tokens"))
            .and(body_json(json!({"repositories": ["widgets"], "permissions": requested})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "token": "ghs_scoped",
                "expires_at": "2030-01-01T00:00:00Z",
                "permissions": issued,
            })))
            .expect(1)
            .mount(&fixture.github)
            .await;
    }

    /// Fails the test if anything reaches the GitHub mock
    async fn forbid_github_calls(fixture: &TestFixture) {
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&fixture.github)
            .await;
    }

    #[tokio::test]
    async fn test_issue_token_success() {
        let fixture = TestFixture::new().await;
        mount_installation(&fixture).await;
        mount_permissions(
            &fixture,
            json!({"contents": "write", "issues": "read", "actions": "read", "metadata": "read"}),
        )
        .await;
        mount_access_token(
            &fixture,
            json!({"contents": "write", "issues": "read"}),
            json!({"contents": "write", "issues": "read", "metadata": "read"}),
        )
        .await;

        let response = fixture
            .post_token("/token?contents=write&issues=read", "acme/widgets")
            .await;

        response.assert_ok();
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(
            response.json,
            json!({
                "token": "ghs_scoped",
                "expires_at": "2030-01-01T00:00:00Z",
                "scopes": {"contents": "write", "issues": "read"},
            })
        );
        let body: TokenResponse = response.json_as();
        assert_eq!(body.scopes.len(), 2);
    }

    #[tokio::test]
    async fn test_read_only_scope_rejected_before_github() {
        let fixture = TestFixture::new().await;
        forbid_github_calls(&fixture).await;

        let response = fixture
            .post_token("/token?administration=write", "acme/widgets")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.error().starts_with(
            "permission 'write' not allowed for scope 'administration'"
        ));
    }

    #[tokio::test]
    async fn test_insufficient_permissions() {
        let fixture = TestFixture::new().await;
        mount_installation(&fixture).await;
        mount_permissions(&fixture, json!({"contents": "write", "metadata": "read"})).await;

        let response = fixture
            .post_token("/token?contents=write&deployments=write", "acme/widgets")
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(
            response.json["details"],
            json!({
                "requested": ["contents", "deployments"],
                "granted": ["contents"],
                "missing": ["deployments"],
            })
        );
        assert!(response.error().contains("deployments"));
    }

    #[tokio::test]
    async fn test_duplicate_scope_rejected_before_github() {
        let fixture = TestFixture::new().await;
        forbid_github_calls(&fixture).await;

        for query in ["contents=read&contents=write", "contents=read&contents=read"] {
            let response = fixture
                .post_token(&format!("/token?{query}"), "acme/widgets")
                .await;

            response.assert_status(StatusCode::BAD_REQUEST);
            assert_eq!(response.error(), "duplicate scope 'contents' in request");
        }
    }

    #[tokio::test]
    async fn test_request_validation_errors() {
        let fixture = TestFixture::new().await;
        forbid_github_calls(&fixture).await;

        let cases = [
            ("/token", "at least one scope is required"),
            (
                "/token?contents=READ",
                "invalid permission 'READ' for scope 'contents' (must be 'read' or 'write')",
            ),
            ("/token?members=read", "scope 'members' is not in allowlist"),
        ];
        for (uri, message) in cases {
            let response = fixture.post_token(uri, "acme/widgets").await;
            response.assert_status(StatusCode::BAD_REQUEST);
            assert_eq!(response.error(), message, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_authorization_header_errors() {
        let fixture = TestFixture::new().await;
        forbid_github_calls(&fixture).await;

        let response = fixture
            .send(fixture.request_builder(Method::POST, "/token?contents=read"))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.error(), "missing Authorization header");

        let response = fixture
            .send(
                fixture
                    .request_builder(Method::POST, "/token?contents=read")
                    .header(AUTHORIZATION, "Basic dXNlcjpwYXNz"),
            )
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.error(),
            "invalid Authorization header format (expected 'Bearer <token>')"
        );

        let response = fixture
            .send(
                fixture
                    .request_builder(Method::POST, "/token?contents=read")
                    .header(AUTHORIZATION, "Bearer not-a-jwt"),
            )
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert!(response.error().starts_with("invalid OIDC token: "));
    }

    #[tokio::test]
    async fn test_lowercase_bearer_scheme_is_accepted() {
        let fixture = TestFixture::new().await;
        mount_installation(&fixture).await;
        mount_permissions(&fixture, json!({"contents": "read"})).await;
        mount_access_token(&fixture, json!({"contents": "read"}), json!({"contents": "read"}))
            .await;

        let token = fixture.oidc_token("acme/widgets");
        let response = fixture
            .send(
                fixture
                    .request_builder(Method::POST, "/token?contents=read")
                    .header(AUTHORIZATION, format!("bearer {token}")),
            )
            .await;

        response.assert_ok();
    }

    #[tokio::test]
    async fn test_owner_allowlist() {
        let fixture = TestFixture::with_allowed_owners("acme").await;
        forbid_github_calls(&fixture).await;

        let response = fixture
            .post_token("/token?contents=read", "evil/widgets")
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(response.error(), "repository owner 'evil' is not allowed");
    }

    #[tokio::test]
    async fn test_app_not_installed() {
        let fixture = TestFixture::new().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/installation"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Not Found"})))
            .mount(&fixture.github)
            .await;

        let response = fixture
            .post_token("/token?contents=read", "acme/widgets")
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        assert!(response.error().contains("not installed"));
    }

    #[tokio::test]
    async fn test_github_outage() {
        let fixture = TestFixture::new().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/installation"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&fixture.github)
            .await;

        let response = fixture
            .post_token("/token?contents=read", "acme/widgets")
            .await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.error().starts_with("GitHub API error: "));
    }

    #[tokio::test]
    async fn test_suspended_installation() {
        let fixture = TestFixture::new().await;
        mount_installation(&fixture).await;
        mount_permissions(&fixture, json!({"contents": "read"})).await;
        Mock::given(method("POST"))
            .and(path("/app/installations/42/access_tokens"))
            .respond_with(
                ResponseTemplate::new(403)
                    .set_body_json(json!({"message": "This installation has been suspended"})),
            )
            .mount(&fixture.github)
            .await;

        let response = fixture
            .post_token("/token?contents=read", "acme/widgets")
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        assert!(response.error().contains("suspended"));
    }

    #[tokio::test]
    async fn test_narrowed_grant_is_not_returned() {
        let fixture = TestFixture::new().await;
        mount_installation(&fixture).await;
        mount_permissions(&fixture, json!({"contents": "write", "issues": "write"})).await;
        mount_access_token(
            &fixture,
            json!({"contents": "write", "issues": "write"}),
            json!({"contents": "write"}),
        )
        .await;

        let response = fixture
            .post_token("/token?contents=write&issues=write", "acme/widgets")
            .await;

        response.assert_status(StatusCode::FORBIDDEN);
        assert!(response.json.get("token").is_none());
        assert!(!response.json.to_string().contains("ghs_scoped"));
        assert_eq!(
            response.json["details"],
            json!({
                "requested": {"contents": "write", "issues": "write"},
                "issued": {"contents": "write"},
            })
        );
    }

    #[tokio::test]
    async fn test_jwks_is_fetched_from_configured_url() {
        let fixture = TestFixture::new().await;
        forbid_github_calls(&fixture).await;

        let requests_before = fixture.oidc.received_requests().await.unwrap_or_default();
        assert!(requests_before.is_empty());

        fixture.post_token("/token", "acme/widgets").await;

        let requests = fixture.oidc.received_requests().await.unwrap_or_default();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.path(), JWKS_PATH);
    }
}
