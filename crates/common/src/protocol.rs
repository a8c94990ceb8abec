//! Types exchanged between the bootstrap and the routes it mounts.
//!
//! [`KeyPair`] and [`ApiConfig`] are produced once at startup and never
//! mutated; [`ErrorResponse`] is the JSON body of every non-2xx response the
//! service itself generates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ServiceError;

// ---------------------------------------------------------------------------
// Key material
// ---------------------------------------------------------------------------

/// Local paths of the provisioned token signing keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// PEM private key used to sign tokens.
    pub private_key_path: PathBuf,
    /// PEM public key used to verify tokens.
    pub public_key_path: PathBuf,
}

/// Everything the versioned API router needs from the bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub key_pair: KeyPair,
    pub aws_region: String,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"not_found"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}
