//! The caller identity extracted from a verified identity token

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubjectError {
    #[error("invalid repository format: {0}")]
    InvalidFormat(String),
}

/// An `owner/path` pair such as `acme/widgets`.
///
/// Everything after the first `/` is kept as the entity path, so nested
/// claims like `org/repo/subpath` are accepted. The repository is the first
/// segment of that path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subject {
    owner: String,
    path: String,
}

impl Subject {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Entity path after the owner, possibly containing further segments
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Repository name, the first segment of the entity path
    pub fn repository(&self) -> &str {
        self.path.split('/').next().unwrap_or_default()
    }
}

impl FromStr for Subject {
    type Err = SubjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SubjectError::InvalidFormat(s.to_string());
        let (owner, path) = s.split_once('/').ok_or_else(invalid)?;
        if owner.is_empty() || path.split('/').next().unwrap_or_default().is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            path: path.to_string(),
        })
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.path)
    }
}
