//! AES-256-GCM-SIV sealing and opening with a fresh random nonce per seal.
//!
//! A nonce is drawn from the OS CSPRNG inside every [`ContentCipher::seal`]
//! call. There is no counter, so no nonce state is shared between calls or
//! between chunks of one stream.

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng, Payload},
    Aes256GcmSiv, Nonce,
};
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the authentication tag appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// Output of a single seal: the nonce it used and the ciphertext + tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Raw nonce bytes.
    pub nonce: [u8; NONCE_LEN],
    /// Raw ciphertext + authentication tag bytes.
    pub ciphertext: Vec<u8>,
}

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    /// The nonce is the wrong length (must be [`NONCE_LEN`] bytes).
    #[error("invalid nonce size: expected {NONCE_LEN} bytes, got {0}")]
    InvalidNonceLength(usize),

    /// Sealing failed. Unreachable with a valid key for inputs below the AEAD limit.
    #[error("aead seal failed")]
    SealFailure,

    /// Authentication failed (wrong key, wrong AAD, or tampered data).
    #[error("aead open failed")]
    OpenFailure,
}

/// An AES-256-GCM-SIV instance keyed with one data key.
pub struct ContentCipher {
    inner: Aes256GcmSiv,
}

impl ContentCipher {
    /// Build a cipher from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] if `key` is not [`KEY_LEN`] bytes.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength(key.len()));
        }
        let inner = Aes256GcmSiv::new_from_slice(key)
            .map_err(|_| CipherError::InvalidKeyLength(key.len()))?;
        Ok(Self { inner })
    }

    /// Seal `plaintext` under a freshly generated nonce with no associated data.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Sealed, CipherError> {
        self.seal_with_aad(plaintext, &[])
    }

    /// Seal `plaintext` under a freshly generated nonce, authenticating `aad`.
    pub fn seal_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> Result<Sealed, CipherError> {
        let nonce = random_nonce();
        let ciphertext = self
            .inner
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| CipherError::SealFailure)?;
        Ok(Sealed { nonce, ciphertext })
    }

    /// Open a ciphertext sealed with no associated data.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidNonceLength`] if `nonce` is not exactly
    /// [`NONCE_LEN`] bytes, and [`CipherError::OpenFailure`] if the tag does
    /// not verify. No plaintext is returned on failure.
    pub fn open(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.open_with_aad(nonce, ciphertext, &[])
    }

    /// Open a ciphertext that authenticated `aad` when sealed.
    pub fn open_with_aad(
        &self,
        nonce: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        if nonce.len() != NONCE_LEN {
            return Err(CipherError::InvalidNonceLength(nonce.len()));
        }
        self.inner
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CipherError::OpenFailure)
    }
}

/// Fill `buf` from the OS CSPRNG.
pub fn fill_random(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}

fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    fill_random(&mut nonce);
    nonce
}
