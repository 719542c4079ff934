//! Request and response bodies of the token API

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use utoipa::ToSchema;

/// A freshly issued installation token
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    /// The installation access token
    pub token: String,
    /// Absolute expiry as an RFC 3339 timestamp
    pub expires_at: String,
    /// The scopes the token was issued with, keyed by scope
    #[schema(example = json!({"contents": "write", "issues": "read"}))]
    pub scopes: BTreeMap<String, String>,
}

/// Error body returned for every failed request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable description of the failure
    pub error: String,
    /// Structured context, present for permission mismatches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
