//! Length-prefixed chunk framing as a [`tokio_util::codec`] encoder/decoder.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::cipher::{Sealed, NONCE_LEN, TAG_LEN};

/// Size of the big-endian length prefix.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Largest `nonce + ciphertext` length a frame may declare (16 MiB).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Smallest valid payload: a nonce and an empty ciphertext's tag.
const MIN_FRAME_LEN: usize = NONCE_LEN + TAG_LEN;

/// One sealed chunk of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Nonce used to seal this chunk.
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext + authentication tag.
    pub ciphertext: Vec<u8>,
}

impl Chunk {
    /// Combined nonce + ciphertext length, as written into the prefix.
    pub fn payload_len(&self) -> usize {
        self.nonce.len() + self.ciphertext.len()
    }
}

impl From<Sealed> for Chunk {
    fn from(sealed: Sealed) -> Self {
        Self {
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
        }
    }
}

/// Errors produced while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame declares (or would need) more than [`MAX_FRAME_LEN`] bytes.
    #[error("chunk size too large: {0} bytes")]
    Oversized(usize),

    /// The frame is too short to hold a nonce and tag.
    #[error("chunk size too small: {0} bytes")]
    Undersized(usize),

    /// The source ended inside a frame.
    #[error("truncated frame: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Bytes the frame needs, prefix included.
        expected: usize,
        /// Bytes that were available.
        actual: usize,
    },

    /// Reading or writing the underlying transport failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Stateless codec for `[u32 BE length][nonce][ciphertext]` frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkCodec;

impl ChunkCodec {
    /// Read the declared payload length without consuming anything.
    fn peek_len(src: &BytesMut) -> Option<usize> {
        if src.len() < LENGTH_PREFIX_LEN {
            return None;
        }
        let mut prefix = [0u8; LENGTH_PREFIX_LEN];
        prefix.copy_from_slice(&src[..LENGTH_PREFIX_LEN]);
        Some(u32::from_be_bytes(prefix) as usize)
    }
}

impl Encoder<Chunk> for ChunkCodec {
    type Error = FrameError;

    fn encode(&mut self, chunk: Chunk, dst: &mut BytesMut) -> Result<(), FrameError> {
        let len = chunk.payload_len();
        if len > MAX_FRAME_LEN {
            return Err(FrameError::Oversized(len));
        }
        dst.reserve(LENGTH_PREFIX_LEN + len);
        // MAX_FRAME_LEN fits in a u32.
        dst.put_u32(len as u32);
        dst.extend_from_slice(&chunk.nonce);
        dst.extend_from_slice(&chunk.ciphertext);
        Ok(())
    }
}

impl Decoder for ChunkCodec {
    type Item = Chunk;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Chunk>, FrameError> {
        let Some(len) = Self::peek_len(src) else {
            return Ok(None);
        };
        if len > MAX_FRAME_LEN {
            return Err(FrameError::Oversized(len));
        }
        if len < MIN_FRAME_LEN {
            return Err(FrameError::Undersized(len));
        }

        let total = LENGTH_PREFIX_LEN + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_LEN);
        let payload = src.split_to(len);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&payload[..NONCE_LEN]);
        Ok(Some(Chunk {
            nonce,
            ciphertext: payload[NONCE_LEN..].to_vec(),
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Chunk>, FrameError> {
        if let Some(chunk) = self.decode(src)? {
            return Ok(Some(chunk));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let expected = Self::peek_len(src).map_or(LENGTH_PREFIX_LEN, |len| LENGTH_PREFIX_LEN + len);
        Err(FrameError::Truncated {
            expected,
            actual: src.len(),
        })
    }
}
