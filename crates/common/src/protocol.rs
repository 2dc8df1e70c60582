//! Request and response bodies for the `envelope-svc` HTTP API.
//!
//! Binary fields travel as standard padded base64 strings. The encryption
//! context is a flat string-to-string map and is echoed back unchanged.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Encrypt endpoint
// ---------------------------------------------------------------------------

/// Request body for `POST /v1/encrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptRequest {
    /// KMS key ID or alias. Falls back to the service's default key when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    /// Encryption context bound to the data key.
    #[serde(default)]
    pub context: HashMap<String, String>,
    /// Base64-encoded plaintext.
    pub plaintext: String,
}

/// Self-contained encrypted envelope, returned by `POST /v1/encrypt` and
/// accepted by `POST /v1/decrypt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeBody {
    /// Base64-encoded wrapped data key.
    pub wrapped_key: String,
    /// Base64-encoded ciphertext including the authentication tag.
    pub ciphertext: String,
    /// Base64-encoded 96-bit nonce.
    pub nonce: String,
    /// Encryption context that must be presented unchanged on decrypt.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Decrypt endpoint
// ---------------------------------------------------------------------------

/// Successful response body for `POST /v1/decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptResponse {
    /// Base64-encoded recovered plaintext.
    pub plaintext: String,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
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

impl From<&crate::ServiceError> for ErrorResponse {
    fn from(err: &crate::ServiceError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Name of the configured key provider (`"aws-kms"` or `"local"`).
    pub key_provider: String,
    /// Whether the key provider will accept requests.
    pub kms_enabled: bool,
}
