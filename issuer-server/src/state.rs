use crate::config::IssuerConfig;
use issuer_engine::{GitHubApp, IdentityVerifier, OidcVerifier, OwnerAllowlist, PolicyTable};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Shared per-process state. Everything in here is read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<PolicyTable>,
    pub allowed_owners: Arc<OwnerAllowlist>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub github: GitHubApp,
    pub request_timeout: Duration,
}

impl AppState {
    fn create_http_client(timeout: u64) -> Result<Client, reqwest::Error> {
        Client::builder()
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(2))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
    }

    pub fn new(config: &IssuerConfig) -> Result<Self, String> {
        let client = Self::create_http_client(config.github.client_timeout)
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        let identity = OidcVerifier::new(
            client.clone(),
            &config.oidc.issuer,
            &config.oidc.audience,
            &config.oidc.jwks_url,
            Duration::from_secs(config.oidc.jwks_cache_ttl),
        );

        let github = GitHubApp::new(
            &config.github.app_id,
            Some(config.github.api_url.clone()),
            client,
            config.github.key_source()?,
        );

        Ok(Self {
            policy: Arc::new(PolicyTable::github_default()),
            allowed_owners: Arc::new(config.github.owner_allowlist()),
            identity: Arc::new(identity),
            github,
            request_timeout: Duration::from_secs(config.request_timeout),
        })
    }
}
