#![allow(dead_code)]

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::LevelFilter;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PRIVATE_KEY: &str = include_str!("../../../testdata/rsa_private.pem");
pub const PUBLIC_KEY: &str = include_str!("../../../testdata/rsa_public.pem");
pub const JWKS: &str = include_str!("../../../testdata/jwks.json");
pub const KEY_ID: &str = "test-key-1";

pub const ISSUER: &str = "https://token.actions.githubusercontent.com";
pub const AUDIENCE: &str = "gh-repo-token-issuer";
pub const JWKS_PATH: &str = "/.well-known/jwks";

pub fn setup_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(LevelFilter::Debug)
        .try_init();
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Claims of a valid Actions token for `repository`
pub fn claims_for(repository: &str) -> Value {
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": format!("repo:{repository}:ref:refs/heads/main"),
        "repository": repository,
        "iat": now(),
        "exp": now() + 300,
    })
}

pub fn sign_with_kid(claims: &Value, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

pub fn sign(claims: &Value) -> String {
    sign_with_kid(claims, Some(KEY_ID))
}

/// Serves the test key set; `expected` is how many fetches the test allows
pub async fn mount_jwks(server: &MockServer, expected: u64) {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(JWKS.as_bytes().to_vec(), "application/json"),
        )
        .expect(expected)
        .mount(server)
        .await;
}
