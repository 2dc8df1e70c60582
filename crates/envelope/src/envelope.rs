//! [`EnvelopeEncryptor`]: one-shot envelope encryption of in-memory payloads.
//!
//! Every call obtains its own data key from the [`KeyProvider`]. The content
//! cipher is AES-256-GCM-SIV with a random 96-bit nonce and no associated
//! data; the encryption context is bound only by the provider's wrap.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::crypto::{ContentCipher, NONCE_LEN};
use crate::error::EnvelopeError;
use crate::kms::{EncryptionContext, KeyProvider};
use crate::stream::{StreamDecryptor, StreamEncryptor, StreamHeader};

/// Self-contained result of [`EnvelopeEncryptor::encrypt`].
///
/// Given access to the key provider, these four fields are sufficient to
/// recover the plaintext.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedData {
    /// Provider-wrapped data key.
    pub wrapped_key: Vec<u8>,
    /// Ciphertext + authentication tag.
    pub ciphertext: Vec<u8>,
    /// Nonce used for the content seal.
    pub nonce: Vec<u8>,
    /// Context the data key was bound to.
    pub context: EncryptionContext,
}

impl fmt::Debug for EncryptedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedData")
            .field("wrapped_key_len", &self.wrapped_key.len())
            .field("ciphertext_len", &self.ciphertext.len())
            .field("nonce_len", &self.nonce.len())
            .field("context_keys", &self.context.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Envelope encryption front-end over a shared [`KeyProvider`].
#[derive(Clone)]
pub struct EnvelopeEncryptor {
    provider: Arc<dyn KeyProvider>,
}

impl EnvelopeEncryptor {
    /// Create an encryptor backed by `provider`.
    pub fn new(provider: Arc<dyn KeyProvider>) -> Self {
        Self { provider }
    }

    /// The underlying key provider.
    pub fn provider(&self) -> &dyn KeyProvider {
        self.provider.as_ref()
    }

    /// Encrypt `plaintext` under a fresh data key issued for `key_id`.
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::Validation`] for an empty plaintext, key ID or context key.
    /// - [`EnvelopeError::Configuration`] if the provider is disabled.
    /// - [`EnvelopeError::KeyService`] if key issuance fails.
    pub async fn encrypt(
        &self,
        plaintext: &[u8],
        key_id: &str,
        context: &EncryptionContext,
    ) -> Result<EncryptedData, EnvelopeError> {
        if plaintext.is_empty() {
            return Err(EnvelopeError::Validation("plaintext cannot be empty".into()));
        }
        validate_key_id(key_id)?;
        validate_context(context)?;
        self.ensure_enabled()?;

        // Dropping `data_key` zeroizes the plaintext half on every return path.
        let data_key = self.provider.generate_data_key(key_id, context).await?;
        let cipher = ContentCipher::new(data_key.plaintext().as_bytes())?;
        let sealed = cipher.seal(plaintext)?;

        debug!(
            key_id,
            plaintext_len = plaintext.len(),
            context_keys = context.len(),
            "payload sealed"
        );

        Ok(EncryptedData {
            wrapped_key: data_key.wrapped_key().to_vec(),
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce.to_vec(),
            context: context.clone(),
        })
    }

    /// Recover the plaintext of an [`EncryptedData`].
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::Validation`] for a missing field or a nonce of the wrong size.
    /// - [`EnvelopeError::Integrity`] if the wrapped key, nonce or ciphertext
    ///   fails authentication, or the context differs from the one used to encrypt.
    /// - [`EnvelopeError::KeyService`] for any other unwrap failure.
    pub async fn decrypt(&self, encrypted: &EncryptedData) -> Result<Vec<u8>, EnvelopeError> {
        if encrypted.wrapped_key.is_empty()
            || encrypted.ciphertext.is_empty()
            || encrypted.nonce.is_empty()
        {
            return Err(EnvelopeError::Validation(
                "invalid encrypted data: missing required fields".into(),
            ));
        }
        if encrypted.nonce.len() != NONCE_LEN {
            return Err(EnvelopeError::Validation(format!(
                "invalid nonce size: expected {NONCE_LEN}, got {}",
                encrypted.nonce.len()
            )));
        }
        validate_context(&encrypted.context)?;
        self.ensure_enabled()?;

        let key = self
            .provider
            .decrypt_data_key(&encrypted.wrapped_key, &encrypted.context)
            .await?;
        let cipher = ContentCipher::new(key.as_bytes())?;
        let plaintext = cipher.open(&encrypted.nonce, &encrypted.ciphertext)?;

        debug!(plaintext_len = plaintext.len(), "payload opened");
        Ok(plaintext)
    }

    /// Start a streaming session writing sealed chunks into `sink`.
    ///
    /// One data key is issued for the whole session. Persist
    /// [`StreamEncryptor::header`] alongside the stream to decrypt it later.
    ///
    /// # Errors
    ///
    /// Same as [`EnvelopeEncryptor::encrypt`], minus the plaintext check.
    pub async fn stream_encryptor<W>(
        &self,
        sink: W,
        key_id: &str,
        context: &EncryptionContext,
    ) -> Result<StreamEncryptor<W>, EnvelopeError>
    where
        W: AsyncWrite + Unpin,
    {
        validate_key_id(key_id)?;
        validate_context(context)?;
        self.ensure_enabled()?;

        let data_key = self.provider.generate_data_key(key_id, context).await?;
        debug!(key_id, "stream session opened");
        StreamEncryptor::new(sink, data_key, context.clone())
    }

    /// Open a stream previously produced by a [`StreamEncryptor`].
    ///
    /// # Errors
    ///
    /// Same as [`EnvelopeEncryptor::decrypt`] for the session key unwrap.
    pub async fn stream_decryptor<R>(
        &self,
        source: R,
        header: &StreamHeader,
    ) -> Result<StreamDecryptor<R>, EnvelopeError>
    where
        R: AsyncRead + Unpin,
    {
        if header.wrapped_key.is_empty() {
            return Err(EnvelopeError::Validation("stream header has no wrapped key".into()));
        }
        validate_context(&header.context)?;
        self.ensure_enabled()?;

        let key = self
            .provider
            .decrypt_data_key(&header.wrapped_key, &header.context)
            .await?;
        StreamDecryptor::new(source, key)
    }

    fn ensure_enabled(&self) -> Result<(), EnvelopeError> {
        if !self.provider.is_enabled() {
            return Err(EnvelopeError::Configuration(format!(
                "key provider {} is not enabled",
                self.provider.name()
            )));
        }
        Ok(())
    }
}

fn validate_key_id(key_id: &str) -> Result<(), EnvelopeError> {
    if key_id.trim().is_empty() {
        return Err(EnvelopeError::Validation("keyID cannot be empty".into()));
    }
    Ok(())
}

fn validate_context(context: &EncryptionContext) -> Result<(), EnvelopeError> {
    if context.keys().any(|k| k.is_empty()) {
        return Err(EnvelopeError::Validation(
            "encryption context keys cannot be empty".into(),
        ));
    }
    Ok(())
}
