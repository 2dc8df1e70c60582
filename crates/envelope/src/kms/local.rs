//! [`LocalKeyProvider`]: an in-process provider holding named master keys.
//!
//! Data keys are wrapped with AES-256-GCM-SIV under a master key. The key ID
//! and the canonicalised encryption context are authenticated as associated
//! data, so unwrapping with a different context fails exactly as KMS does.
//!
//! # Wrapped key layout
//!
//! ```text
//! [u8 key-id length][key id][12-byte nonce][sealed data key + 16-byte tag]
//! ```

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tracing::debug;

use super::{DataKey, EncryptionContext, KeyProvider, KeyProviderError, PlaintextKey};
use crate::crypto::{ContentCipher, KEY_LEN, NONCE_LEN, TAG_LEN};

/// Provider that wraps data keys under master keys held in memory.
pub struct LocalKeyProvider {
    master_keys: HashMap<String, PlaintextKey>,
    enabled: bool,
}

impl LocalKeyProvider {
    /// Create an enabled provider with no master keys.
    pub fn new() -> Self {
        Self {
            master_keys: HashMap::new(),
            enabled: true,
        }
    }

    /// Register `master` under `key_id`, replacing any previous key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyProviderError::InvalidKeyId`] if `key_id` is empty or
    /// longer than 255 bytes.
    pub fn with_key(
        mut self,
        key_id: impl Into<String>,
        master: PlaintextKey,
    ) -> Result<Self, KeyProviderError> {
        let key_id = key_id.into();
        if key_id.is_empty() || key_id.len() > usize::from(u8::MAX) {
            return Err(KeyProviderError::InvalidKeyId(key_id));
        }
        self.master_keys.insert(key_id, master);
        Ok(self)
    }

    /// Register a freshly generated master key under `key_id`.
    pub fn with_generated_key(self, key_id: impl Into<String>) -> Result<Self, KeyProviderError> {
        self.with_key(key_id, PlaintextKey::generate())
    }

    /// Enable or disable the provider.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn cipher_for(&self, key_id: &str) -> Option<Result<ContentCipher, KeyProviderError>> {
        self.master_keys.get(key_id).map(|master| {
            ContentCipher::new(master.as_bytes())
                .map_err(|_| KeyProviderError::InvalidKeyMaterial(KEY_LEN))
        })
    }
}

impl Default for LocalKeyProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyProvider for LocalKeyProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn generate_data_key(
        &self,
        key_id: &str,
        context: &EncryptionContext,
    ) -> Result<DataKey, KeyProviderError> {
        if !self.enabled {
            return Err(KeyProviderError::Disabled);
        }
        validate_context(context)?;
        let cipher = self
            .cipher_for(key_id)
            .ok_or_else(|| KeyProviderError::NotFound(key_id.to_owned()))??;

        let plaintext = PlaintextKey::generate();
        let sealed = cipher
            .seal_with_aad(plaintext.as_bytes(), &associated_data(key_id, context))
            .map_err(|e| KeyProviderError::Unavailable(e.to_string()))?;

        let mut wrapped = Vec::with_capacity(1 + key_id.len() + NONCE_LEN + sealed.ciphertext.len());
        // with_key bounds key IDs to 255 bytes.
        wrapped.push(key_id.len() as u8);
        wrapped.extend_from_slice(key_id.as_bytes());
        wrapped.extend_from_slice(&sealed.nonce);
        wrapped.extend_from_slice(&sealed.ciphertext);

        debug!(key_id, context_keys = context.len(), "local data key issued");
        Ok(DataKey::new(plaintext, wrapped))
    }

    async fn decrypt_data_key(
        &self,
        wrapped_key: &[u8],
        context: &EncryptionContext,
    ) -> Result<PlaintextKey, KeyProviderError> {
        if !self.enabled {
            return Err(KeyProviderError::Disabled);
        }
        validate_context(context)?;
        let parts = WrappedParts::parse(wrapped_key).ok_or(KeyProviderError::InvalidCiphertext)?;

        // The key ID is covered by the AAD, so an unknown ID is a tampered blob.
        let cipher = self
            .cipher_for(parts.key_id)
            .ok_or(KeyProviderError::InvalidCiphertext)??;

        let plaintext = zeroize::Zeroizing::new(
            cipher
                .open_with_aad(
                    parts.nonce,
                    parts.sealed,
                    &associated_data(parts.key_id, context),
                )
                .map_err(|_| KeyProviderError::InvalidCiphertext)?,
        );
        PlaintextKey::from_slice(&plaintext)
    }
}

/// Borrowed view of a wrapped key.
struct WrappedParts<'a> {
    key_id: &'a str,
    nonce: &'a [u8],
    sealed: &'a [u8],
}

impl<'a> WrappedParts<'a> {
    fn parse(wrapped: &'a [u8]) -> Option<Self> {
        let (&id_len, rest) = wrapped.split_first()?;
        let id_len = usize::from(id_len);
        if id_len == 0 || rest.len() != id_len + NONCE_LEN + KEY_LEN + TAG_LEN {
            return None;
        }
        let (id, rest) = rest.split_at(id_len);
        let (nonce, sealed) = rest.split_at(NONCE_LEN);
        Some(Self {
            key_id: std::str::from_utf8(id).ok()?,
            nonce,
            sealed,
        })
    }
}

fn validate_context(context: &EncryptionContext) -> Result<(), KeyProviderError> {
    if context.keys().any(|k| k.is_empty()) {
        return Err(KeyProviderError::InvalidContext(
            "context keys must not be empty".into(),
        ));
    }
    Ok(())
}

/// Canonical AAD: the key ID, then context entries sorted by key, each field
/// prefixed with its u32 big-endian length.
fn associated_data(key_id: &str, context: &EncryptionContext) -> Vec<u8> {
    let sorted: BTreeMap<&str, &str> = context
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let mut aad = Vec::new();
    push_field(&mut aad, key_id);
    for (k, v) in sorted {
        push_field(&mut aad, k);
        push_field(&mut aad, v);
    }
    aad
}

fn push_field(buf: &mut Vec<u8>, field: &str) {
    buf.extend_from_slice(&(field.len() as u32).to_be_bytes());
    buf.extend_from_slice(field.as_bytes());
}
