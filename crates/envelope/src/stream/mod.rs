//! Chunked streaming encryption under one session data key.
//!
//! A stream is the concatenation of frames produced by
//! [`crate::crypto::ChunkCodec`], one per sealed chunk of at most
//! [`CHUNK_SIZE`] plaintext bytes. There is no stream header or trailer on
//! the wire: the wrapped session key travels separately in a
//! [`StreamHeader`], and end of stream is the end of the source.
//!
//! Each chunk carries its own nonce and tag, so any chunk can be
//! authenticated on its own, but the plaintext is only reconstructed by
//! reading every chunk in order.

pub mod decryptor;
pub mod encryptor;

pub use decryptor::StreamDecryptor;
pub use encryptor::{StreamEncryptor, StreamState};

use crate::kms::EncryptionContext;

/// Plaintext bytes sealed per full chunk (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Out-of-band metadata needed to decrypt a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Provider-wrapped session key.
    pub wrapped_key: Vec<u8>,
    /// Context the session key was bound to.
    pub context: EncryptionContext,
}
