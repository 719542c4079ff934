//! Requested scopes and the parser that turns raw query parameters into them

use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing the requested scopes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("duplicate scope '{0}' in request")]
    DuplicateScope(String),
    #[error("invalid permission '{1}' for scope '{0}' (must be 'read' or 'write')")]
    InvalidPermission(String, String),
    #[error("at least one scope is required")]
    NoScopesRequested,
}

/// Access level that can be requested for a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
        }
    }

    /// Whether a grant at this level satisfies a request for `requested`.
    ///
    /// Equal levels always satisfy. A `write` grant also satisfies a `read`
    /// request; a `read` grant never satisfies a `write` request.
    pub fn satisfies(&self, requested: AccessLevel) -> bool {
        matches!(
            (self, requested),
            (AccessLevel::Read, AccessLevel::Read)
                | (AccessLevel::Write, AccessLevel::Write)
                | (AccessLevel::Write, AccessLevel::Read)
        )
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive parse. No aliases and no trimming.
impl FromStr for AccessLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(AccessLevel::Read),
            "write" => Ok(AccessLevel::Write),
            _ => Err(()),
        }
    }
}

/// A validated set of requested scopes, keyed by scope identifier.
///
/// Every identifier appears once and the collection is never empty. It is
/// built once per request and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScopeRequest(BTreeMap<String, AccessLevel>);

impl ScopeRequest {
    /// Parses a raw query string (`contents=write&issues=read`).
    ///
    /// A missing query is handled exactly like an empty one.
    pub fn from_query(query: Option<&str>) -> Result<Self, ScopeError> {
        let pairs = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes());
        Self::from_pairs(pairs)
    }

    /// Parses an ordered sequence of `(scope, level)` pairs where a scope may
    /// repeat. Any repeated scope is rejected, even with identical values.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ScopeError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in pairs {
            grouped.entry(key.into()).or_default().push(value.into());
        }
        Self::from_multimap(&grouped)
    }

    /// Parses a multi-valued `scope -> values` collection.
    pub fn from_multimap(params: &BTreeMap<String, Vec<String>>) -> Result<Self, ScopeError> {
        let mut scopes = BTreeMap::new();

        for (scope, values) in params {
            let value = match values.as_slice() {
                [single] => single,
                [] => continue,
                _ => return Err(ScopeError::DuplicateScope(scope.clone())),
            };

            let level = value
                .parse::<AccessLevel>()
                .map_err(|_| ScopeError::InvalidPermission(scope.clone(), value.clone()))?;
            scopes.insert(scope.clone(), level);
        }

        if scopes.is_empty() {
            return Err(ScopeError::NoScopesRequested);
        }

        Ok(Self(scopes))
    }

    pub fn get(&self, scope: &str) -> Option<AccessLevel> {
        self.0.get(scope).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, AccessLevel> {
        self.0.iter()
    }

    /// Scope identifiers in sorted order
    pub fn scope_ids(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn as_map(&self) -> &BTreeMap<String, AccessLevel> {
        &self.0
    }
}

impl<'a> IntoIterator for &'a ScopeRequest {
    type Item = (&'a String, &'a AccessLevel);
    type IntoIter = btree_map::Iter<'a, String, AccessLevel>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
