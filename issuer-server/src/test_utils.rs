use crate::config::IssuerConfig;
use crate::create_app;
use crate::state::AppState;
use axum::body::Body;
use axum::Router;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::LevelFilter;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PRIVATE_KEY: &str = include_str!("../../testdata/rsa_private.pem");
pub const JWKS: &str = include_str!("../../testdata/jwks.json");
pub const KEY_ID: &str = "test-key-1";
pub const JWKS_PATH: &str = "/.well-known/jwks";

/// Test fixture wiring the application to mock GitHub and OIDC servers.
///
/// The OIDC mock serves the test key set, so tokens from
/// [`TestFixture::oidc_token`] verify. GitHub responses are mounted per
/// test on [`TestFixture::github`].
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///
///     Mock::given(matchers::method("GET"))
///         .and(matchers::path("/repos/acme/widgets/installation"))
///         .respond_with(ResponseTemplate::new(404))
///         .mount(&fixture.github)
///         .await;
///
///     let response = fixture.post_token("/token?contents=read", "acme/widgets").await;
///     response.assert_status(StatusCode::FORBIDDEN);
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration the app was built from
    pub config: IssuerConfig,
    /// Mock server for the GitHub REST API
    pub github: MockServer,
    /// Mock server publishing the OIDC signing keys
    pub oidc: MockServer,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_allowed_owners("").await
    }

    /// Creates a fixture whose owner allowlist is the given comma-separated list
    pub async fn with_allowed_owners(allowed_owners: &str) -> Self {
        let _ = env_logger::builder()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();

        let github = MockServer::start().await;
        let oidc = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(JWKS.as_bytes().to_vec(), "application/json"),
            )
            .mount(&oidc)
            .await;

        let mut config = IssuerConfig::for_test_with_mocks(&github, &oidc, PRIVATE_KEY);
        config.github.allowed_owners = allowed_owners.to_string();

        let state = AppState::new(&config).expect("Failed to create test state");
        let app = create_app(state);

        Self {
            app,
            config,
            github,
            oidc,
        }
    }

    /// Signs an Actions-style OIDC token for `repository` with the test key
    pub fn oidc_token(&self, repository: &str) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = json!({
            "iss": self.config.oidc.issuer,
            "aud": self.config.oidc.audience,
            "sub": format!("repo:{repository}:ref:refs/heads/main"),
            "repository": repository,
            "repository_owner": repository.split('/').next().unwrap_or_default(),
            "iat": now,
            "exp": now + 300,
        });
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(KEY_ID.to_string());
        let key = EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).expect("Invalid test key");
        encode(&header, &claims, &key).expect("Failed to sign test token")
    }

    /// Creates a request builder without any credentials attached
    pub fn request_builder(&self, method: Method, uri: impl AsRef<str>) -> http::request::Builder {
        Request::builder().method(method).uri(uri.as_ref())
    }

    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        self.send(self.request_builder(Method::GET, uri)).await
    }

    /// Sends `POST uri` authenticated as a workflow of `repository`
    pub async fn post_token(&self, uri: impl AsRef<str>, repository: &str) -> TestResponse {
        let builder = self
            .request_builder(Method::POST, uri)
            .header(AUTHORIZATION, format!("Bearer {}", self.oidc_token(repository)));
        self.send(builder).await
    }

    pub async fn send(&self, builder: http::request::Builder) -> TestResponse {
        let request = builder.body(Body::empty()).expect("Failed to build request");
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to empty object if parsing fails or empty body
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };

        TestResponse {
            status,
            content_type,
            json,
        }
    }

    /// Sends a request and returns the status and body text as-is
    pub async fn send_raw(&self, builder: http::request::Builder) -> (StatusCode, String) {
        let request = builder.body(Body::empty()).expect("Failed to build request");
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();
        (status, String::from_utf8_lossy(&body).into_owned())
    }
}

/// Response from a test request with convenient access to status and JSON body
pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub json: Value,
}

impl TestResponse {
    pub fn assert_status(&self, expected: StatusCode) {
        assert_eq!(
            self.status, expected,
            "Expected status code {}, got {} with body: {}",
            expected, self.status, self.json
        );
    }

    pub fn assert_ok(&self) {
        self.assert_status(StatusCode::OK);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The `error` message of an error body
    pub fn error(&self) -> &str {
        self.json["error"].as_str().unwrap_or_default()
    }

    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response")
    }
}
