//! The external authority that owns installations and mints credentials

use crate::permissions::GrantedPermissionSet;
use crate::scopes::{AccessLevel, ScopeRequest};
use crate::subject::Subject;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors reported by an [`Authority`] implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    #[error("GitHub App is not installed for repository '{0}'")]
    NotInstalled(String),
    #[error("GitHub App installation {0} is suspended")]
    Suspended(u64),
    #[error("{0}")]
    Unavailable(String),
}

/// Authority-side binding between the app and a subject's repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Installation {
    pub id: u64,
    /// Repository the issued credential is restricted to
    pub repository: String,
}

/// A freshly minted credential and the access it actually carries
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub levels: BTreeMap<String, AccessLevel>,
}

impl fmt::Debug for IssuedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCredential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("levels", &self.levels)
            .finish()
    }
}

/// Calls the credential exchange needs from the authority.
///
/// Every call is a fresh round trip; implementations must not cache.
#[async_trait]
pub trait Authority: Send + Sync {
    /// Looks up the installation covering the subject's repository
    async fn resolve_installation(&self, subject: &Subject) -> Result<Installation, AuthorityError>;

    /// Fetches what the installation is currently granted
    async fn fetch_granted_permissions(
        &self,
        installation: &Installation,
    ) -> Result<GrantedPermissionSet, AuthorityError>;

    /// Mints a credential for exactly the requested scopes
    async fn issue_credential(
        &self,
        installation: &Installation,
        scopes: &ScopeRequest,
    ) -> Result<IssuedCredential, AuthorityError>;
}
