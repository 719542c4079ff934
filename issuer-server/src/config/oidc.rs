use confique::Config;

/// Identity token verification settings
#[derive(Debug, Config, Clone)]
pub struct OidcConfig {
    /// Expected `iss` claim
    /// (default: https://token.actions.githubusercontent.com)
    #[config(env = "OIDC_ISSUER", default = "https://token.actions.githubusercontent.com")]
    pub issuer: String,

    /// Where the issuer publishes its signing keys
    /// (default: https://token.actions.githubusercontent.com/.well-known/jwks)
    #[config(
        env = "OIDC_JWKS_URL",
        default = "https://token.actions.githubusercontent.com/.well-known/jwks"
    )]
    pub jwks_url: String,

    /// Expected `aud` claim (default: gh-repo-token-issuer)
    #[config(env = "OIDC_AUDIENCE", default = "gh-repo-token-issuer")]
    pub audience: String,

    /// How long fetched signing keys are reused, in seconds (default: 3600)
    #[config(env = "OIDC_JWKS_CACHE_TTL", default = 3600)]
    pub jwks_cache_ttl: u64,
}
