//! Zeroizing containers for data-key material.

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

use super::KeyProviderError;
use crate::crypto::{cipher::fill_random, KEY_LEN};

/// Heap buffer holding exactly [`KEY_LEN`] bytes of plaintext key.
///
/// The bytes never leave their allocation: moving a `PlaintextKey` moves only
/// the pointer. They are overwritten with zeroes when the value is dropped,
/// and on demand through [`Zeroize::zeroize`]. Deliberately not `Clone`.
pub struct PlaintextKey(Box<[u8; KEY_LEN]>);

impl PlaintextKey {
    /// Copy key material out of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyProviderError::InvalidKeyMaterial`] if `bytes` is not
    /// exactly [`KEY_LEN`] long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyProviderError> {
        if bytes.len() != KEY_LEN {
            return Err(KeyProviderError::InvalidKeyMaterial(bytes.len()));
        }
        let mut key = Self::zeroed();
        key.0.copy_from_slice(bytes);
        Ok(key)
    }

    /// Generate a random key from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut key = Self::zeroed();
        fill_random(key.0.as_mut_slice());
        key
    }

    fn zeroed() -> Self {
        Self(Box::new([0u8; KEY_LEN]))
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Returns `true` once the key has been zeroized.
    pub fn is_zeroed(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl Zeroize for PlaintextKey {
    fn zeroize(&mut self) {
        self.0.as_mut_slice().zeroize();
    }
}

impl Drop for PlaintextKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for PlaintextKey {}

impl fmt::Debug for PlaintextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlaintextKey([REDACTED])")
    }
}

/// A freshly issued data key: plaintext plus the provider-wrapped form.
///
/// Lives for one operation or one stream session. Dropping it zeroizes the
/// plaintext half.
pub struct DataKey {
    plaintext: PlaintextKey,
    wrapped: Vec<u8>,
}

impl DataKey {
    /// Pair a plaintext key with its wrapped form.
    pub fn new(plaintext: PlaintextKey, wrapped: Vec<u8>) -> Self {
        Self { plaintext, wrapped }
    }

    /// Borrow the plaintext key.
    pub fn plaintext(&self) -> &PlaintextKey {
        &self.plaintext
    }

    /// Borrow the wrapped key bytes.
    pub fn wrapped_key(&self) -> &[u8] {
        &self.wrapped
    }

    /// Split into the plaintext key and the wrapped key.
    pub fn into_parts(self) -> (PlaintextKey, Vec<u8>) {
        (self.plaintext, self.wrapped)
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataKey")
            .field("plaintext", &self.plaintext)
            .field("wrapped_len", &self.wrapped.len())
            .finish()
    }
}
