//! Verification of GitHub Actions OIDC tokens and extraction of the
//! repository subject they were issued for.

use crate::subject::Subject;
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use log::{debug, info};
use moka::future::Cache;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ISSUER: &str = "https://token.actions.githubusercontent.com";
pub const DEFAULT_JWKS_URL: &str = "https://token.actions.githubusercontent.com/.well-known/jwks";
pub const DEFAULT_AUDIENCE: &str = "gh-repo-token-issuer";

const REPOSITORY_CLAIM: &str = "repository";

/// Minimum time between refetches forced by an unknown `kid`
pub const MIN_KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to fetch JWKS: {0}")]
    Jwks(String),
    #[error("unexpected signing method: {0:?}")]
    UnexpectedAlgorithm(Algorithm),
    #[error("missing kid in token header")]
    MissingKeyId,
    #[error("key {0} not found in JWKS")]
    KeyNotFound(String),
    #[error("invalid key {kid} in JWKS: {reason}")]
    InvalidKey { kid: String, reason: String },
    #[error("token validation failed: {0}")]
    Validation(#[from] jsonwebtoken::errors::Error),
    #[error("repository claim not found in OIDC token")]
    MissingRepository,
    #[error("invalid repository format: {0}")]
    InvalidRepository(String),
}

/// Turns a bearer identity assertion into the verified [`Subject`]
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Subject, IdentityError>;
}

/// Reads the subject out of already-verified claims.
///
/// The `repository` claim must be a non-empty `owner/path` string.
pub fn extract_subject(claims: &Map<String, Value>) -> Result<Subject, IdentityError> {
    let repository = claims
        .get(REPOSITORY_CLAIM)
        .and_then(Value::as_str)
        .filter(|repository| !repository.is_empty())
        .ok_or(IdentityError::MissingRepository)?;

    repository
        .parse()
        .map_err(|_| IdentityError::InvalidRepository(repository.to_string()))
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

impl JwkSet {
    fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid.as_deref() == Some(kid))
    }
}

impl Jwk {
    fn decoding_key(&self, kid: &str) -> Result<DecodingKey, IdentityError> {
        let invalid = |reason: &str| IdentityError::InvalidKey {
            kid: kid.to_string(),
            reason: reason.to_string(),
        };
        if self.kty != "RSA" {
            return Err(invalid(&format!("unsupported key type {}", self.kty)));
        }
        let n = self.n.as_deref().ok_or_else(|| invalid("missing modulus"))?;
        let e = self.e.as_deref().ok_or_else(|| invalid("missing exponent"))?;
        DecodingKey::from_rsa_components(n, e).map_err(|err| invalid(&err.to_string()))
    }
}

/// RS256 OIDC verifier backed by the issuer's JWKS.
///
/// The key set is cached for the configured TTL. Concurrent misses share a
/// single fetch. An unknown `kid` forces a refetch so rotated keys are picked
/// up before the TTL runs out, at most once per [`MIN_KEY_REFRESH_INTERVAL`].
pub struct OidcVerifier {
    client: Client,
    issuer: String,
    audience: String,
    jwks_url: String,
    jwks: Cache<String, Arc<JwkSet>>,
    // An entry here means a forced refresh happened within the interval
    recent_refresh: Cache<String, ()>,
}

impl OidcVerifier {
    pub fn new(
        client: Client,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        jwks_url: impl Into<String>,
        cache_ttl: Duration,
    ) -> Self {
        Self::with_refresh_interval(
            client,
            issuer,
            audience,
            jwks_url,
            cache_ttl,
            MIN_KEY_REFRESH_INTERVAL,
        )
    }

    /// Like [`OidcVerifier::new`] with a custom minimum interval between
    /// refetches triggered by unknown key IDs
    pub fn with_refresh_interval(
        client: Client,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        jwks_url: impl Into<String>,
        cache_ttl: Duration,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            client,
            issuer: issuer.into(),
            audience: audience.into(),
            jwks_url: jwks_url.into(),
            jwks: Cache::builder()
                .max_capacity(1)
                .time_to_live(cache_ttl)
                .build(),
            recent_refresh: Cache::builder()
                .max_capacity(1)
                .time_to_live(refresh_interval)
                .build(),
        }
    }

    async fn fetch_jwks(&self) -> Result<Arc<JwkSet>, String> {
        info!("Fetching JWKS from {}", self.jwks_url);

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if !response.status().is_success() {
            return Err(format!(
                "JWKS request failed with status {}",
                response.status().as_u16()
            ));
        }

        let jwks: JwkSet = response.json().await.map_err(|err| err.to_string())?;
        Ok(Arc::new(jwks))
    }

    async fn cached_jwks(&self) -> Result<Arc<JwkSet>, IdentityError> {
        self.jwks
            .try_get_with(self.jwks_url.clone(), self.fetch_jwks())
            .await
            .map_err(|err| IdentityError::Jwks(err.to_string()))
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, IdentityError> {
        let jwks = self.cached_jwks().await?;
        if let Some(key) = jwks.find(kid) {
            return key.decoding_key(kid);
        }

        let claimed = self
            .recent_refresh
            .entry(self.jwks_url.clone())
            .or_insert_with(async {})
            .await
            .is_fresh();
        if !claimed {
            debug!("Key {} not in cached JWKS, refreshed recently", kid);
            return Err(IdentityError::KeyNotFound(kid.to_string()));
        }

        debug!("Key {} not in cached JWKS, refreshing", kid);
        self.jwks.invalidate(&self.jwks_url).await;
        let jwks = self.cached_jwks().await?;
        jwks.find(kid)
            .ok_or_else(|| IdentityError::KeyNotFound(kid.to_string()))?
            .decoding_key(kid)
    }
}

#[async_trait]
impl IdentityVerifier for OidcVerifier {
    async fn verify(&self, token: &str) -> Result<Subject, IdentityError> {
        let header = decode_header(token)?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::UnexpectedAlgorithm(header.alg));
        }
        let kid = header.kid.ok_or(IdentityError::MissingKeyId)?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);

        let data = decode::<Map<String, Value>>(token, &key, &validation)?;
        extract_subject(&data.claims)
    }
}
