//! Translation between internal scope identifiers and the authority's
//! permission field names, and the coverage check between a request and
//! what an installation has been granted.

use crate::scopes::{AccessLevel, ScopeRequest};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};

/// Internal scope identifier -> GitHub installation permission field.
///
/// Most names match; `projects` and `secret_scanning` do not.
pub const SCOPE_FIELDS: &[(&str, &str)] = &[
    ("actions", "actions"),
    ("administration", "administration"),
    ("attestations", "attestations"),
    ("checks", "checks"),
    ("contents", "contents"),
    ("dependabot_secrets", "dependabot_secrets"),
    ("deployments", "deployments"),
    ("discussions", "discussions"),
    ("environments", "environments"),
    ("issues", "issues"),
    ("merge_queues", "merge_queues"),
    ("packages", "packages"),
    ("pages", "pages"),
    ("projects", "repository_projects"),
    ("pull_requests", "pull_requests"),
    ("secret_scanning", "secret_scanning_alerts"),
    ("secrets", "secrets"),
    ("statuses", "statuses"),
    ("workflows", "workflows"),
];

pub fn external_field(scope: &str) -> Option<&'static str> {
    SCOPE_FIELDS
        .iter()
        .find(|(internal, _)| *internal == scope)
        .map(|(_, external)| *external)
}

pub fn internal_scope(field: &str) -> Option<&'static str> {
    SCOPE_FIELDS
        .iter()
        .find(|(_, external)| *external == field)
        .map(|(internal, _)| *internal)
}

/// Converts a request into the authority's `field -> level` body.
/// Scopes without a translation are left out.
pub fn to_external(scopes: &ScopeRequest) -> BTreeMap<String, String> {
    scopes
        .iter()
        .filter_map(|(scope, level)| match external_field(scope) {
            Some(field) => Some((field.to_string(), level.to_string())),
            None => {
                warn!("Scope '{}' has no permission field, not requesting it", scope);
                None
            }
        })
        .collect()
}

/// Access levels per internal scope, as reported by the authority
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantedPermissionSet(BTreeMap<String, AccessLevel>);

impl GrantedPermissionSet {
    pub fn new(levels: BTreeMap<String, AccessLevel>) -> Self {
        Self(levels)
    }

    /// Builds the set from the authority's raw permission fields.
    ///
    /// Fields outside [`SCOPE_FIELDS`] (e.g. the implicit `metadata`) and
    /// levels other than `read`/`write` are dropped.
    pub fn from_external(fields: &HashMap<String, String>) -> Self {
        let mut levels = BTreeMap::new();
        for (field, value) in fields {
            match (internal_scope(field), value.parse::<AccessLevel>()) {
                (Some(scope), Ok(level)) => {
                    levels.insert(scope.to_string(), level);
                }
                _ => debug!("Ignoring permission field '{}' = '{}'", field, value),
            }
        }
        Self(levels)
    }

    pub fn get(&self, scope: &str) -> Option<AccessLevel> {
        self.0.get(scope).copied()
    }

    pub fn scope_ids(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn as_map(&self) -> &BTreeMap<String, AccessLevel> {
        &self.0
    }

    /// Requested scopes this set does not cover, in sorted order.
    ///
    /// A scope is covered when it is present with a level that satisfies the
    /// request (see [`AccessLevel::satisfies`]). Extra granted scopes are
    /// ignored.
    pub fn missing(&self, requested: &ScopeRequest) -> Vec<String> {
        requested
            .iter()
            .filter(|(scope, level)| {
                !self
                    .get(scope)
                    .is_some_and(|granted| granted.satisfies(**level))
            })
            .map(|(scope, _)| scope.clone())
            .collect()
    }
}
