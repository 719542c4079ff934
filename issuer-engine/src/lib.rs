//! Core of the repository token issuer.
//!
//! A GitHub Actions OIDC token is exchanged for a GitHub App installation
//! token restricted to the caller's repository and to the scopes it asked
//! for. Every request is checked locally (scope parsing, owner allowlist,
//! policy table) before the GitHub API is contacted, then checked again
//! against what the installation is granted and what the issued token
//! actually carries.

pub mod authority;
pub mod exchange;
pub mod github;
pub mod identity;
pub mod permissions;
pub mod policy;
pub mod scopes;
pub mod secrets;
pub mod subject;

pub use authority::{Authority, AuthorityError, Installation, IssuedCredential};
pub use exchange::{exchange, ExchangeError};
pub use github::{create_app_jwt, AppAuthError, GitHubApp, GitHubAuthority};
pub use identity::{IdentityError, IdentityVerifier, OidcVerifier};
pub use permissions::GrantedPermissionSet;
pub use policy::{OwnerAllowlist, PolicyError, PolicyTable, PolicyTableError};
pub use scopes::{AccessLevel, ScopeError, ScopeRequest};
pub use secrets::{EnvKeySource, FileKeySource, SecretError, SigningKeySource};
pub use subject::{Subject, SubjectError};
