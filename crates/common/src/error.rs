//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::IntegrityFailure`] → 422
/// - [`ServiceError::KeyService`] → 502
/// - [`ServiceError::Unavailable`] → 503
/// - [`ServiceError::Internal`] → 500
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed: a missing field, bad base64 or invalid JSON.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The ciphertext, nonce or wrapped key failed authentication.
    #[error("integrity check failed")]
    IntegrityFailure,

    /// The upstream key service rejected or failed the request.
    #[error("key service error: {0}")]
    KeyService(String),

    /// The key provider is disabled or not configured.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::IntegrityFailure => 422,
            ServiceError::KeyService(_) => 502,
            ServiceError::Unavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in [`crate::protocol::ErrorResponse`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::IntegrityFailure => "integrity_failure",
            ServiceError::KeyService(_) => "key_service_error",
            ServiceError::Unavailable(_) => "service_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }
}
