//! Static scope policy and the owner allowlist
//!
//! Both are built once at startup, shared read-only between requests, and
//! consulted before any call to the authority is made.

use crate::scopes::{AccessLevel, ScopeRequest};
use crate::subject::Subject;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Request rejections produced by the local policy checks
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("scope '{0}' is not allowed")]
    ScopeDenied(String),
    #[error("scope '{0}' is not in allowlist")]
    ScopeNotRecognized(String),
    #[error(
        "permission '{level}' not allowed for scope '{scope}' (allowed: [{}])",
        join_levels(.allowed)
    )]
    PermissionNotAllowed {
        scope: String,
        level: AccessLevel,
        allowed: Vec<AccessLevel>,
    },
    #[error("repository owner '{0}' is not allowed")]
    OwnerNotAllowed(String),
}

/// Errors raised when constructing an inconsistent policy table
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyTableError {
    #[error("scope '{0}' is both permitted and denied")]
    Conflict(String),
    #[error("scope '{0}' permits no access level")]
    EmptyEntry(String),
}

fn join_levels(levels: &[AccessLevel]) -> String {
    levels
        .iter()
        .map(AccessLevel::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

const READ_WRITE: &[AccessLevel] = &[AccessLevel::Read, AccessLevel::Write];
const READ_ONLY: &[AccessLevel] = &[AccessLevel::Read];

/// Repository scopes a GitHub App token may be requested for
const DEFAULT_PERMITTED: &[(&str, &[AccessLevel])] = &[
    ("actions", READ_WRITE),
    ("attestations", READ_WRITE),
    ("checks", READ_WRITE),
    ("contents", READ_WRITE),
    ("dependabot_secrets", READ_WRITE),
    ("deployments", READ_WRITE),
    ("discussions", READ_WRITE),
    ("environments", READ_WRITE),
    ("issues", READ_WRITE),
    ("merge_queues", READ_WRITE),
    ("packages", READ_WRITE),
    ("pages", READ_WRITE),
    ("projects", READ_WRITE),
    ("pull_requests", READ_WRITE),
    ("secrets", READ_WRITE),
    ("statuses", READ_WRITE),
    ("workflows", READ_WRITE),
    // Read-only for security
    ("administration", READ_ONLY),
    ("secret_scanning", READ_ONLY),
];

/// Scopes refused regardless of the permit mapping
const DEFAULT_DENIED: &[&str] = &[];

/// Allow/deny matrix for requested scopes.
///
/// The permit mapping and the deny set are disjoint; [`PolicyTable::new`]
/// refuses to build a table that violates this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTable {
    permitted: BTreeMap<String, BTreeSet<AccessLevel>>,
    denied: BTreeSet<String>,
}

impl PolicyTable {
    pub fn new(
        permitted: BTreeMap<String, BTreeSet<AccessLevel>>,
        denied: BTreeSet<String>,
    ) -> Result<Self, PolicyTableError> {
        if let Some(scope) = denied.iter().find(|scope| permitted.contains_key(*scope)) {
            return Err(PolicyTableError::Conflict(scope.clone()));
        }
        if let Some((scope, _)) = permitted.iter().find(|(_, levels)| levels.is_empty()) {
            return Err(PolicyTableError::EmptyEntry(scope.clone()));
        }
        Ok(Self { permitted, denied })
    }

    /// The built-in repository policy
    pub fn github_default() -> Self {
        let permitted = DEFAULT_PERMITTED
            .iter()
            .map(|(scope, levels)| (scope.to_string(), levels.iter().copied().collect()))
            .collect();
        let denied = DEFAULT_DENIED.iter().map(|scope| scope.to_string()).collect();
        Self { permitted, denied }
    }

    pub fn permitted_levels(&self, scope: &str) -> Option<&BTreeSet<AccessLevel>> {
        self.permitted.get(scope)
    }

    pub fn is_denied(&self, scope: &str) -> bool {
        self.denied.contains(scope)
    }

    pub fn permitted_scopes(&self) -> impl Iterator<Item = &str> {
        self.permitted.keys().map(String::as_str)
    }

    pub fn denied_scopes(&self) -> impl Iterator<Item = &str> {
        self.denied.iter().map(String::as_str)
    }

    /// Checks every requested scope against the table, failing on the first
    /// violation found.
    pub fn validate(&self, scopes: &ScopeRequest) -> Result<(), PolicyError> {
        for (scope, level) in scopes {
            if self.is_denied(scope) {
                return Err(PolicyError::ScopeDenied(scope.clone()));
            }

            let allowed = self
                .permitted_levels(scope)
                .ok_or_else(|| PolicyError::ScopeNotRecognized(scope.clone()))?;

            if !allowed.contains(level) {
                return Err(PolicyError::PermissionNotAllowed {
                    scope: scope.clone(),
                    level: *level,
                    allowed: allowed.iter().copied().collect(),
                });
            }
        }
        Ok(())
    }
}

/// Optional restriction on which subject owners may request tokens.
/// An empty list disables the check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnerAllowlist {
    owners: Vec<String>,
}

impl OwnerAllowlist {
    pub fn new<I, S>(owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            owners: owners.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses a comma-separated list; whitespace is trimmed and empty
    /// entries are dropped.
    pub fn parse(value: &str) -> Self {
        Self::new(
            value
                .split(',')
                .map(str::trim)
                .filter(|owner| !owner.is_empty()),
        )
    }

    pub fn is_enabled(&self) -> bool {
        !self.owners.is_empty()
    }

    pub fn owners(&self) -> &[String] {
        &self.owners
    }

    /// Case-sensitive exact match on the subject's owner
    pub fn check(&self, subject: &Subject) -> Result<(), PolicyError> {
        if !self.is_enabled() || self.owners.iter().any(|owner| owner == subject.owner()) {
            return Ok(());
        }
        Err(PolicyError::OwnerNotAllowed(subject.owner().to_string()))
    }
}
