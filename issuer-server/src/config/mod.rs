use crate::config::github::GitHubConfig;
use crate::config::oidc::OidcConfig;
use confique::Config;

pub mod github;
pub mod oidc;

/// Main configuration structure for the token issuer
#[derive(Debug, Config, Clone)]
pub struct IssuerConfig {
    /// The port the server will listen to (default: 8080)
    #[config(env = "PORT", default = 8080)]
    pub port: u16,

    /// Deadline for the whole GitHub exchange of one request in seconds (default: 30)
    #[config(env = "REQUEST_TIMEOUT", default = 30)]
    pub request_timeout: u64,

    /// GitHub App configuration
    #[config(nested)]
    pub github: GitHubConfig,

    /// OIDC verification configuration
    #[config(nested)]
    pub oidc: OidcConfig,
}

impl IssuerConfig {
    /// Creates a new Config instance from environment variables
    pub fn new() -> Result<Self, String> {
        let config = Self::builder()
            .env()
            .load()
            .map_err(|e| e.to_string())?;
        // Fail at startup rather than on the first request
        config.github.key_source()?;
        Ok(config)
    }

    #[cfg(test)]
    pub fn for_test_with_mocks(
        github_mock: &wiremock::MockServer,
        oidc_mock: &wiremock::MockServer,
        private_key: &str,
    ) -> Self {
        Self {
            port: 0, // Let the OS choose a port
            request_timeout: 5,
            github: GitHubConfig {
                app_id: "123456".to_string(),
                api_url: github_mock.uri(),
                client_timeout: 5,
                allowed_owners: "".to_string(),
                private_key: Some(private_key.to_string()),
                private_key_path: None,
            },
            oidc: OidcConfig {
                issuer: "https://token.actions.githubusercontent.com".to_string(),
                jwks_url: format!("{}/.well-known/jwks", oidc_mock.uri()),
                audience: "gh-repo-token-issuer".to_string(),
                jwks_cache_ttl: 3600,
            },
        }
    }
}
