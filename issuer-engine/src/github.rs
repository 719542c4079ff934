//! GitHub App client: app JWT minting and the REST calls behind [`Authority`]

use crate::authority::{Authority, AuthorityError, Installation, IssuedCredential};
use crate::permissions::{to_external, GrantedPermissionSet};
use crate::scopes::ScopeRequest;
use crate::secrets::{SecretError, SigningKeySource};
use crate::subject::Subject;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::{debug, error};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";
const MEDIA_TYPE: &str = "application/vnd.github+json";
const CLIENT_USER_AGENT: &str = concat!("gh-repo-token-issuer/", env!("CARGO_PKG_VERSION"));

/// Lifetime of an app JWT. GitHub rejects anything above ten minutes.
const APP_JWT_LIFETIME_SECS: i64 = 600;

#[derive(Debug, Error)]
pub enum AppAuthError {
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error("failed to create JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Mints the short-lived RS256 JWT that authenticates as the app itself
pub fn create_app_jwt(private_key_pem: &str, app_id: &str) -> Result<String, AppAuthError> {
    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())?;
    let now = Utc::now().timestamp();
    let claims = AppClaims {
        iat: now,
        exp: now + APP_JWT_LIFETIME_SECS,
        iss: app_id.to_string(),
    };
    Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
}

/// Long-lived handle to a GitHub App.
///
/// Holds no credentials itself; [`GitHubApp::authenticate`] fetches the
/// signing key and mints a fresh app JWT each time it is called.
#[derive(Clone)]
pub struct GitHubApp {
    app_id: String,
    api_url: String,
    client: Client,
    key_source: Arc<dyn SigningKeySource>,
}

impl GitHubApp {
    pub fn new(
        app_id: impl Into<String>,
        api_url: Option<String>,
        client: Client,
        key_source: Arc<dyn SigningKeySource>,
    ) -> Self {
        let api_url = api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Self {
            app_id: app_id.into(),
            api_url: api_url.trim_end_matches('/').to_string(),
            client,
            key_source,
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Returns an authority bound to a freshly minted app JWT
    pub async fn authenticate(&self) -> Result<GitHubAuthority, AppAuthError> {
        let pem = self.key_source.fetch_signing_key().await?;
        let jwt = create_app_jwt(&pem, &self.app_id)?;
        Ok(GitHubAuthority {
            client: self.client.clone(),
            api_url: self.api_url.clone(),
            jwt,
        })
    }
}

#[derive(Debug, Deserialize)]
struct InstallationResponse {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct InstallationDetails {
    #[serde(default)]
    permissions: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
struct AccessTokenRequest<'a> {
    repositories: [&'a str; 1],
    permissions: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
    #[serde(default)]
    permissions: HashMap<String, String>,
}

/// GitHub REST API acting as the credential authority, authenticated as
/// the app.
pub struct GitHubAuthority {
    client: Client,
    api_url: String,
    jwt: String,
}

fn unavailable(err: reqwest::Error) -> AuthorityError {
    AuthorityError::Unavailable(err.to_string())
}

impl GitHubAuthority {
    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .bearer_auth(&self.jwt)
            .header(reqwest::header::ACCEPT, MEDIA_TYPE)
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(reqwest::header::USER_AGENT, CLIENT_USER_AGENT)
    }

    async fn unexpected_status(response: Response) -> AuthorityError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("GitHub API returned {}: {}", status, body);
        AuthorityError::Unavailable(format!("unexpected status {}: {}", status, body))
    }
}

#[async_trait]
impl Authority for GitHubAuthority {
    async fn resolve_installation(&self, subject: &Subject) -> Result<Installation, AuthorityError> {
        let repository = format!("{}/{}", subject.owner(), subject.repository());
        let url = format!("{}/repos/{}/installation", self.api_url, repository);

        debug!("Resolving installation: {}", url);

        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(unavailable)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AuthorityError::NotInstalled(repository));
        }

        if !response.status().is_success() {
            return Err(Self::unexpected_status(response).await);
        }

        let installation: InstallationResponse = response.json().await.map_err(unavailable)?;
        Ok(Installation {
            id: installation.id,
            repository: subject.repository().to_string(),
        })
    }

    async fn fetch_granted_permissions(
        &self,
        installation: &Installation,
    ) -> Result<GrantedPermissionSet, AuthorityError> {
        let url = format!("{}/app/installations/{}", self.api_url, installation.id);

        debug!("Fetching installation permissions: {}", url);

        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(Self::unexpected_status(response).await);
        }

        let details: InstallationDetails = response.json().await.map_err(unavailable)?;
        Ok(GrantedPermissionSet::from_external(&details.permissions))
    }

    async fn issue_credential(
        &self,
        installation: &Installation,
        scopes: &ScopeRequest,
    ) -> Result<IssuedCredential, AuthorityError> {
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url, installation.id
        );
        let body = AccessTokenRequest {
            repositories: [installation.repository.as_str()],
            permissions: to_external(scopes),
        };

        debug!(
            "Requesting installation token for {} with {:?}",
            installation.repository, body.permissions
        );

        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(unavailable)?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            let text = response.text().await.unwrap_or_default();
            if text.to_lowercase().contains("suspended") {
                return Err(AuthorityError::Suspended(installation.id));
            }
            error!("GitHub refused installation token: {}", text);
            return Err(AuthorityError::Unavailable(format!(
                "unexpected status {}: {}",
                status, text
            )));
        }

        if !status.is_success() {
            return Err(Self::unexpected_status(response).await);
        }

        let token: AccessTokenResponse = response.json().await.map_err(unavailable)?;
        let issued = GrantedPermissionSet::from_external(&token.permissions);
        Ok(IssuedCredential {
            token: token.token,
            expires_at: token.expires_at,
            levels: issued.as_map().clone(),
        })
    }
}
