//! [`EnvelopeError`]: the failure taxonomy of the envelope and stream layers.

use common::ServiceError;
use thiserror::Error;

use crate::crypto::cipher::CipherError;
use crate::crypto::FrameError;
use crate::kms::KeyProviderError;

/// Errors produced by [`crate::EnvelopeEncryptor`], [`crate::StreamEncryptor`]
/// and [`crate::StreamDecryptor`].
///
/// Local validation failures are raised before the key provider is contacted.
/// Messages never include key material or plaintext.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The key provider is disabled, or a stream session is already closed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required input was empty or malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// The key provider failed to issue or unwrap a data key.
    #[error("key service error: {0}")]
    KeyService(#[source] KeyProviderError),

    /// The AEAD cipher could not be constructed from the data key.
    #[error("cipher setup failed: {0}")]
    CryptoSetup(String),

    /// Authentication failed: tampered data, or the wrong key or context.
    #[error("integrity check failed")]
    Integrity,

    /// A chunk frame declared an invalid length.
    #[error("framing error: {0}")]
    Framing(String),

    /// The source ended before a frame's declared length was available.
    #[error("stream truncated: frame declares {expected} bytes, {actual} available")]
    StreamTruncated {
        /// Bytes declared by the frame header (including the header).
        expected: usize,
        /// Bytes actually available when the source was exhausted.
        actual: usize,
    },

    /// The underlying byte sink or source failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<KeyProviderError> for EnvelopeError {
    fn from(err: KeyProviderError) -> Self {
        match err {
            KeyProviderError::Disabled => {
                EnvelopeError::Configuration("key provider is disabled".into())
            }
            KeyProviderError::InvalidCiphertext => EnvelopeError::Integrity,
            KeyProviderError::InvalidKeyMaterial(len) => {
                EnvelopeError::CryptoSetup(format!("data key has invalid length {len}"))
            }
            other => EnvelopeError::KeyService(other),
        }
    }
}

impl From<CipherError> for EnvelopeError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::OpenFailure => EnvelopeError::Integrity,
            CipherError::InvalidNonceLength(_) => EnvelopeError::Validation(err.to_string()),
            CipherError::InvalidKeyLength(_) | CipherError::SealFailure => {
                EnvelopeError::CryptoSetup(err.to_string())
            }
        }
    }
}

impl From<FrameError> for EnvelopeError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Truncated { expected, actual } => {
                EnvelopeError::StreamTruncated { expected, actual }
            }
            FrameError::Io(e) => EnvelopeError::Io(e),
            other => EnvelopeError::Framing(other.to_string()),
        }
    }
}

impl From<EnvelopeError> for ServiceError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Validation(msg) => ServiceError::BadRequest(msg),
            EnvelopeError::Integrity => ServiceError::IntegrityFailure,
            EnvelopeError::Configuration(msg) => ServiceError::Unavailable(msg),
            EnvelopeError::KeyService(e) => ServiceError::KeyService(e.to_string()),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}
