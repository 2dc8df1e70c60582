//! [`StreamDecryptor`]: the read side of a chunked stream.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;
use tracing::debug;
use zeroize::Zeroize;

use super::CHUNK_SIZE;
use crate::crypto::{Chunk, ChunkCodec, ContentCipher, FrameError};
use crate::error::EnvelopeError;
use crate::kms::PlaintextKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Reading,
    Finished,
    Failed,
}

/// Decodes frames from `source` and opens them in order with the session key.
///
/// The session key is zeroized at end of stream, on the first error, and on
/// drop. After an error every further call fails.
pub struct StreamDecryptor<R> {
    source: R,
    key: PlaintextKey,
    cipher: Option<ContentCipher>,
    buffer: BytesMut,
    codec: ChunkCodec,
    state: ReadState,
    chunks_read: u64,
}

impl<R: AsyncRead + Unpin> StreamDecryptor<R> {
    pub(crate) fn new(source: R, key: PlaintextKey) -> Result<Self, EnvelopeError> {
        let cipher = ContentCipher::new(key.as_bytes())?;
        Ok(Self {
            source,
            key,
            cipher: Some(cipher),
            buffer: BytesMut::with_capacity(CHUNK_SIZE),
            codec: ChunkCodec,
            state: ReadState::Reading,
            chunks_read: 0,
        })
    }

    /// Number of chunks opened so far.
    pub fn chunks_read(&self) -> u64 {
        self.chunks_read
    }

    /// Plaintext of the next chunk, or `None` once the source is exhausted
    /// on a frame boundary.
    ///
    /// # Errors
    ///
    /// - [`EnvelopeError::Framing`] for a frame declaring an invalid length.
    /// - [`EnvelopeError::StreamTruncated`] if the source ends inside a frame.
    /// - [`EnvelopeError::Integrity`] if a chunk fails authentication.
    /// - [`EnvelopeError::Configuration`] when called again after any error.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, EnvelopeError> {
        match self.state {
            ReadState::Finished => return Ok(None),
            ReadState::Failed => {
                return Err(EnvelopeError::Configuration(
                    "stream decryptor failed; no further chunks".into(),
                ))
            }
            ReadState::Reading => {}
        }

        match self.read_and_open().await {
            Ok(Some(plaintext)) => {
                self.chunks_read += 1;
                Ok(Some(plaintext))
            }
            Ok(None) => {
                debug!(chunks = self.chunks_read, "stream fully decrypted");
                self.finish(ReadState::Finished);
                Ok(None)
            }
            Err(e) => {
                self.finish(ReadState::Failed);
                Err(e)
            }
        }
    }

    /// Decrypt every remaining chunk and concatenate the plaintext.
    ///
    /// Nothing is returned unless the whole stream authenticates.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, EnvelopeError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    async fn read_and_open(&mut self) -> Result<Option<Vec<u8>>, EnvelopeError> {
        let Some(chunk) = self.next_frame().await? else {
            return Ok(None);
        };
        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| EnvelopeError::Configuration("stream decryptor is finished".into()))?;
        Ok(Some(cipher.open(&chunk.nonce, &chunk.ciphertext)?))
    }

    async fn next_frame(&mut self) -> Result<Option<Chunk>, FrameError> {
        loop {
            if let Some(chunk) = self.codec.decode(&mut self.buffer)? {
                return Ok(Some(chunk));
            }
            if self.source.read_buf(&mut self.buffer).await? == 0 {
                return self.codec.decode_eof(&mut self.buffer);
            }
        }
    }

    fn finish(&mut self, state: ReadState) {
        self.state = state;
        self.cipher = None;
        self.key.zeroize();
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{MAX_FRAME_LEN, NONCE_LEN};
    use bytes::BufMut;
    use tokio_util::codec::Encoder;

    fn key() -> PlaintextKey {
        PlaintextKey::from_slice(&[0x11; crate::crypto::KEY_LEN]).unwrap()
    }

    fn encode(parts: &[&str]) -> Vec<u8> {
        let cipher = ContentCipher::new(key().as_bytes()).unwrap();
        let mut out = BytesMut::new();
        for part in parts {
            let sealed = cipher.seal(part.as_bytes()).unwrap();
            ChunkCodec.encode(Chunk::from(sealed), &mut out).unwrap();
        }
        out.to_vec()
    }

    #[tokio::test]
    async fn yields_chunks_in_order() {
        let wire = encode(&["first", "second"]);
        let mut d = StreamDecryptor::new(wire.as_slice(), key()).unwrap();
        assert_eq!(d.next_chunk().await.unwrap().unwrap(), b"first");
        assert_eq!(d.next_chunk().await.unwrap().unwrap(), b"second");
        assert!(d.next_chunk().await.unwrap().is_none());
        assert!(d.next_chunk().await.unwrap().is_none());
        assert_eq!(d.chunks_read(), 2);
        assert!(d.key.is_zeroed());
    }

    #[tokio::test]
    async fn empty_source_is_empty_stream() {
        let mut d = StreamDecryptor::new(&b""[..], key()).unwrap();
        assert!(d.read_to_end().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn truncated_stream_is_not_integrity_error() {
        let wire = encode(&["whole chunk", "cut short"]);
        let cut = &wire[..wire.len() - 3];
        let mut d = StreamDecryptor::new(cut, key()).unwrap();
        assert!(d.next_chunk().await.unwrap().is_some());
        assert!(matches!(
            d.next_chunk().await,
            Err(EnvelopeError::StreamTruncated { .. })
        ));
        assert!(d.key.is_zeroed());
    }

    #[tokio::test]
    async fn tampered_chunk_fails_and_poisons_decryptor() {
        let mut wire = encode(&["one", "two"]);
        let last = wire.len() - 1;
        wire[last] ^= 0x01;
        let mut d = StreamDecryptor::new(wire.as_slice(), key()).unwrap();
        assert_eq!(d.read_to_end().await.unwrap_err().to_string(), "integrity check failed");
        assert!(matches!(
            d.next_chunk().await,
            Err(EnvelopeError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn oversized_frame_rejected() {
        let mut wire = BytesMut::new();
        wire.put_u32((MAX_FRAME_LEN + 1) as u32);
        wire.extend_from_slice(&[0u8; NONCE_LEN]);
        let mut d = StreamDecryptor::new(&wire[..], key()).unwrap();
        assert!(matches!(
            d.next_chunk().await,
            Err(EnvelopeError::Framing(_))
        ));
    }

    #[tokio::test]
    async fn reordered_chunks_still_authenticate_individually() {
        let a = encode(&["aaaa"]);
        let b = encode(&["bbbb"]);
        let swapped: Vec<u8> = b.iter().chain(a.iter()).copied().collect();
        let mut d = StreamDecryptor::new(swapped.as_slice(), key()).unwrap();
        assert_eq!(d.read_to_end().await.unwrap(), b"bbbbaaaa");
    }
}
