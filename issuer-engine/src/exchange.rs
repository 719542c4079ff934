//! The credential exchange protocol.
//!
//! Runs the five authority-facing steps in strict sequence:
//!
//! 1. resolve the subject's installation
//! 2. fetch the installation's granted permissions
//! 3. verify the request is covered by the grant
//! 4. ask the authority for a credential
//! 5. verify the credential carries exactly what was requested
//!
//! Nothing is retried. The first failure ends the request.

use crate::authority::{Authority, AuthorityError, IssuedCredential};
use crate::scopes::ScopeRequest;
use crate::subject::Subject;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("{0}")]
    IntegrationNotInstalled(String),
    #[error("GitHub API error: {0}")]
    AuthorityUnavailable(String),
    #[error("insufficient permissions: installation is missing {}", .missing.join(", "))]
    InsufficientPermissions {
        requested: Vec<String>,
        granted: Vec<String>,
        missing: Vec<String>,
    },
    #[error("{0}")]
    InstallationSuspended(String),
    #[error("issued token permissions do not match the requested scopes")]
    GrantMismatch {
        requested: BTreeMap<String, String>,
        issued: BTreeMap<String, String>,
    },
}

impl From<AuthorityError> for ExchangeError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::NotInstalled(_) => ExchangeError::IntegrationNotInstalled(err.to_string()),
            AuthorityError::Suspended(_) => ExchangeError::InstallationSuspended(err.to_string()),
            AuthorityError::Unavailable(message) => ExchangeError::AuthorityUnavailable(message),
        }
    }
}

fn level_strings<'a, I, V>(levels: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a String, V)>,
    V: std::fmt::Display,
{
    levels
        .into_iter()
        .map(|(scope, level)| (scope.clone(), level.to_string()))
        .collect()
}

/// Runs the protocol for `subject` under an overall deadline.
///
/// Exceeding `timeout` at any step yields
/// `AuthorityUnavailable("request timed out")`.
pub async fn exchange(
    authority: &dyn Authority,
    subject: &Subject,
    scopes: &ScopeRequest,
    timeout: Duration,
) -> Result<IssuedCredential, ExchangeError> {
    match tokio::time::timeout(timeout, run(authority, subject, scopes)).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Credential exchange for {} exceeded {:?}", subject, timeout);
            Err(ExchangeError::AuthorityUnavailable(
                "request timed out".to_string(),
            ))
        }
    }
}

async fn run(
    authority: &dyn Authority,
    subject: &Subject,
    scopes: &ScopeRequest,
) -> Result<IssuedCredential, ExchangeError> {
    let installation = authority.resolve_installation(subject).await?;
    debug!(
        "Resolved installation {} for {}",
        installation.id, subject
    );

    let granted = authority.fetch_granted_permissions(&installation).await?;
    let missing = granted.missing(scopes);
    if !missing.is_empty() {
        return Err(ExchangeError::InsufficientPermissions {
            requested: scopes.scope_ids(),
            granted: granted.scope_ids(),
            missing,
        });
    }

    let credential = authority.issue_credential(&installation, scopes).await?;
    if &credential.levels != scopes.as_map() {
        // The minted token is dropped here and never leaves this function
        return Err(ExchangeError::GrantMismatch {
            requested: level_strings(scopes),
            issued: level_strings(&credential.levels),
        });
    }

    Ok(credential)
}
