//! Where the GitHub App's private signing key comes from.
//!
//! Keys are fetched on every request and never cached.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("failed to read private key from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("private key is empty")]
    Empty,
}

#[async_trait]
pub trait SigningKeySource: Send + Sync {
    /// Returns the PEM-encoded RSA private key
    async fn fetch_signing_key(&self) -> Result<String, SecretError>;
}

/// A key held in memory, typically loaded from an environment variable
pub struct EnvKeySource {
    pem: String,
}

impl EnvKeySource {
    pub fn new(pem: impl Into<String>) -> Self {
        Self { pem: pem.into() }
    }
}

#[async_trait]
impl SigningKeySource for EnvKeySource {
    async fn fetch_signing_key(&self) -> Result<String, SecretError> {
        if self.pem.trim().is_empty() {
            return Err(SecretError::Empty);
        }
        Ok(self.pem.clone())
    }
}

/// A key read from disk on every call, so rotated files are picked up
pub struct FileKeySource {
    path: PathBuf,
}

impl FileKeySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SigningKeySource for FileKeySource {
    async fn fetch_signing_key(&self) -> Result<String, SecretError> {
        let pem = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SecretError::Read {
                path: self.path.display().to_string(),
                source,
            })?;
        if pem.trim().is_empty() {
            return Err(SecretError::Empty);
        }
        Ok(pem)
    }
}
