use confique::Config;
use issuer_engine::{EnvKeySource, FileKeySource, OwnerAllowlist, SigningKeySource};
use std::sync::Arc;

/// GitHub App configuration
#[derive(Debug, Config, Clone)]
pub struct GitHubConfig {
    /// Numeric ID of the GitHub App (required)
    #[config(env = "GITHUB_APP_ID")]
    pub app_id: String,

    /// GitHub REST API base URL (default: https://api.github.com)
    #[config(env = "GITHUB_API_URL", default = "https://api.github.com")]
    pub api_url: String,

    /// The timeout for individual GitHub API calls in seconds (default: 10)
    #[config(env = "GITHUB_CLIENT_TIMEOUT", default = 10)]
    pub client_timeout: u64,

    /// Repository owners allowed to request tokens
    /// Comma-separated list, empty allows every owner (default: "")
    #[config(env = "GITHUB_ALLOWED_OWNERS", default = "")]
    pub allowed_owners: String,

    /// PEM-encoded private key of the app
    #[config(env = "GITHUB_APP_PRIVATE_KEY")]
    pub private_key: Option<String>,

    /// Path to the PEM-encoded private key, read on every request
    #[config(env = "GITHUB_APP_PRIVATE_KEY_PATH")]
    pub private_key_path: Option<String>,
}

impl GitHubConfig {
    pub fn owner_allowlist(&self) -> OwnerAllowlist {
        OwnerAllowlist::parse(&self.allowed_owners)
    }

    /// Picks the signing key source; an inline key wins over a key file
    pub fn key_source(&self) -> Result<Arc<dyn SigningKeySource>, String> {
        match (&self.private_key, &self.private_key_path) {
            (Some(pem), _) if !pem.trim().is_empty() => Ok(Arc::new(EnvKeySource::new(pem.clone()))),
            (_, Some(path)) if !path.trim().is_empty() => Ok(Arc::new(FileKeySource::new(path))),
            _ => Err(
                "either GITHUB_APP_PRIVATE_KEY or GITHUB_APP_PRIVATE_KEY_PATH must be set"
                    .to_string(),
            ),
        }
    }
}
