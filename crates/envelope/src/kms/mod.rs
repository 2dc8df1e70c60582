//! Key Provider abstraction: data-key issuance and unwrapping.
//!
//! # Lifecycle
//!
//! 1. [`KeyProvider::generate_data_key`] issues a fresh 256-bit data key,
//!    returned both in plaintext and in a provider-wrapped form bound to the
//!    caller's [`EncryptionContext`].
//! 2. The plaintext half lives in a [`PlaintextKey`], which overwrites itself
//!    with zeroes when dropped or explicitly zeroized.
//! 3. [`KeyProvider::decrypt_data_key`] recovers the plaintext key from the
//!    wrapped form, provided the same context is presented.
//!
//! # Security invariants
//!
//! - Plaintext key bytes are **never** logged, serialised, or included in traces.
//! - Providers perform their own retries and timeouts; this layer adds none.

pub mod aws;
pub mod key;
pub mod local;

pub use aws::AwsKmsProvider;
pub use key::{DataKey, PlaintextKey};
pub use local::LocalKeyProvider;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Caller-supplied metadata bound to a data key by the provider.
pub type EncryptionContext = HashMap<String, String>;

/// Errors produced by a [`KeyProvider`].
#[derive(Debug, Error)]
pub enum KeyProviderError {
    /// The provider is switched off by configuration.
    #[error("key provider is disabled")]
    Disabled,

    /// The requested key ID does not exist.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The caller is not authorised to use the key.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The wrapped key could not be authenticated under the supplied context.
    #[error("wrapped key is invalid or does not match the encryption context")]
    InvalidCiphertext,

    /// The encryption context is malformed.
    #[error("invalid encryption context: {0}")]
    InvalidContext(String),

    /// The key ID cannot be used by this provider.
    #[error("invalid key id: {0}")]
    InvalidKeyId(String),

    /// The provider returned key material that is not a 256-bit key.
    #[error("provider returned {0} bytes of key material")]
    InvalidKeyMaterial(usize),

    /// The provider could not be reached or failed internally.
    #[error("key provider unavailable: {0}")]
    Unavailable(String),
}

/// Source of data keys for envelope encryption.
///
/// Implementations must be cheap to share behind an `Arc` and safe to call
/// concurrently. Calls may block on the network for as long as the provider's
/// own timeout policy allows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyProvider: Send + Sync {
    /// Short provider name used in logs and health output.
    fn name(&self) -> &'static str;

    /// Whether the provider will accept requests.
    fn is_enabled(&self) -> bool;

    /// Issue a new data key under `key_id`, bound to `context`.
    async fn generate_data_key(
        &self,
        key_id: &str,
        context: &EncryptionContext,
    ) -> Result<DataKey, KeyProviderError>;

    /// Recover the plaintext of a key previously issued by
    /// [`KeyProvider::generate_data_key`].
    ///
    /// Fails with [`KeyProviderError::InvalidCiphertext`] if `wrapped_key` was
    /// altered or `context` differs from the one used at issuance.
    async fn decrypt_data_key(
        &self,
        wrapped_key: &[u8],
        context: &EncryptionContext,
    ) -> Result<PlaintextKey, KeyProviderError>;
}
