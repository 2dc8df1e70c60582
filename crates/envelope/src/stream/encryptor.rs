//! [`StreamEncryptor`]: a write-side session that seals fixed-size chunks.

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Encoder;
use tracing::{debug, warn};
use zeroize::Zeroize;

use super::{StreamHeader, CHUNK_SIZE};
use crate::crypto::{Chunk, ChunkCodec, ContentCipher};
use crate::error::EnvelopeError;
use crate::kms::{DataKey, EncryptionContext, PlaintextKey};

/// Lifecycle of a [`StreamEncryptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Accepting writes.
    Open,
    /// Sealing the final partial chunk.
    Closing,
    /// Key zeroized; writes rejected. Terminal.
    Closed,
}

/// Buffers plaintext and emits one sealed frame per [`CHUNK_SIZE`] bytes.
///
/// Holds a single data key for the whole session. Not synchronised: callers
/// sharing a session across tasks must serialise access themselves.
pub struct StreamEncryptor<W> {
    sink: W,
    key: PlaintextKey,
    cipher: Option<ContentCipher>,
    header: StreamHeader,
    pending: BytesMut,
    frame: BytesMut,
    codec: ChunkCodec,
    state: StreamState,
    poisoned: bool,
    chunks_written: u64,
}

impl<W: AsyncWrite + Unpin> StreamEncryptor<W> {
    pub(crate) fn new(
        sink: W,
        data_key: DataKey,
        context: EncryptionContext,
    ) -> Result<Self, EnvelopeError> {
        let (key, wrapped_key) = data_key.into_parts();
        let cipher = ContentCipher::new(key.as_bytes())?;
        Ok(Self {
            sink,
            key,
            cipher: Some(cipher),
            header: StreamHeader {
                wrapped_key,
                context,
            },
            pending: BytesMut::with_capacity(CHUNK_SIZE),
            frame: BytesMut::new(),
            codec: ChunkCodec,
            state: StreamState::Open,
            poisoned: false,
            chunks_written: 0,
        })
    }

    /// Metadata to persist alongside the stream for later decryption.
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Number of frames emitted so far.
    pub fn chunks_written(&self) -> u64 {
        self.chunks_written
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Buffer `buf`, sealing and emitting every full chunk it completes.
    ///
    /// Returns the number of bytes accepted, which is always `buf.len()` on
    /// success. An empty `buf` is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Configuration`] once the session is closing or
    /// closed, and [`EnvelopeError::Io`] if the sink rejects a frame. A failed
    /// seal or emit poisons the session: the key is zeroized, the state becomes
    /// [`StreamState::Closed`] and every later call fails.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, EnvelopeError> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }

        self.pending.extend_from_slice(buf);
        while self.pending.len() >= CHUNK_SIZE {
            let chunk = self.pending.split_to(CHUNK_SIZE);
            if let Err(e) = self.seal_and_emit(&chunk).await {
                self.poison();
                return Err(e);
            }
        }
        Ok(buf.len())
    }

    /// Seal any buffered remainder, zeroize the session key and shut the sink down.
    ///
    /// Calling `close` again after it has succeeded is a no-op: the final
    /// chunk is never emitted twice. The key is zeroized even if the final
    /// seal or write fails; the session is then poisoned and later calls
    /// return [`EnvelopeError::Configuration`]. A `close` that was cancelled
    /// mid-flush poisons the session the same way.
    pub async fn close(&mut self) -> Result<(), EnvelopeError> {
        match self.state {
            StreamState::Closed if self.poisoned => return Err(poisoned_error()),
            StreamState::Closed => return Ok(()),
            StreamState::Closing => {
                self.poison();
                return Err(poisoned_error());
            }
            StreamState::Open => {}
        }

        self.state = StreamState::Closing;
        if let Err(e) = self.flush_remainder().await {
            self.poison();
            return Err(e);
        }
        self.release_key();
        self.state = StreamState::Closed;

        self.sink.shutdown().await?;
        debug!(chunks = self.chunks_written, "stream session closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), EnvelopeError> {
        match self.state {
            StreamState::Open => Ok(()),
            _ if self.poisoned => Err(poisoned_error()),
            _ => Err(EnvelopeError::Configuration(
                "stream encryptor is closed".into(),
            )),
        }
    }

    fn poison(&mut self) {
        warn!(
            chunks = self.chunks_written,
            "stream encryptor failed mid-stream; session abandoned"
        );
        self.poisoned = true;
        self.pending.clear();
        self.release_key();
        self.state = StreamState::Closed;
    }

    async fn flush_remainder(&mut self) -> Result<(), EnvelopeError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let remainder = self.pending.split();
        self.seal_and_emit(&remainder).await
    }

    async fn seal_and_emit(&mut self, plaintext: &[u8]) -> Result<(), EnvelopeError> {
        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| EnvelopeError::Configuration("stream encryptor is closed".into()))?;
        let sealed = cipher.seal(plaintext)?;

        self.frame.clear();
        self.codec.encode(Chunk::from(sealed), &mut self.frame)?;
        self.sink.write_all(&self.frame).await?;
        self.chunks_written += 1;
        Ok(())
    }

    fn release_key(&mut self) {
        self.cipher = None;
        self.key.zeroize();
    }
}

fn poisoned_error() -> EnvelopeError {
    EnvelopeError::Configuration("stream encryptor failed; output is incomplete".into())
}

impl<W> Drop for StreamEncryptor<W> {
    fn drop(&mut self) {
        if self.state == StreamState::Open && !self.pending.is_empty() {
            warn!(
                buffered = self.pending.len(),
                "stream encryptor dropped without close; buffered plaintext discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::{KeyProvider, LocalKeyProvider};
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio_util::codec::Decoder;

    async fn session<W: AsyncWrite + Unpin>(sink: W) -> StreamEncryptor<W> {
        let provider = LocalKeyProvider::new().with_generated_key("k").unwrap();
        let dk = provider
            .generate_data_key("k", &EncryptionContext::new())
            .await
            .unwrap();
        StreamEncryptor::new(sink, dk, EncryptionContext::new()).unwrap()
    }

    fn frames(bytes: &[u8]) -> Vec<Chunk> {
        let mut buf = BytesMut::from(bytes);
        let mut out = Vec::new();
        while let Some(chunk) = ChunkCodec.decode_eof(&mut buf).unwrap() {
            out.push(chunk);
        }
        out
    }

    /// Sink that records whether `shutdown` reached it.
    #[derive(Default)]
    struct RecordingSink {
        bytes: Vec<u8>,
        shutdowns: usize,
    }

    impl AsyncWrite for RecordingSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.bytes.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            self.shutdowns += 1;
            Poll::Ready(Ok(()))
        }
    }

    /// Sink that fails every write.
    struct BrokenSink;

    impl AsyncWrite for BrokenSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn full_chunk_emitted_as_soon_as_buffer_fills() {
        let mut s = session(Vec::new()).await;
        s.write(&vec![1u8; CHUNK_SIZE - 1]).await.unwrap();
        assert_eq!(s.chunks_written(), 0);
        assert!(s.get_ref().is_empty());
        s.write(&[1u8; 2]).await.unwrap();
        assert_eq!(s.chunks_written(), 1);
        assert_eq!(s.pending.len(), 1);
    }

    #[tokio::test]
    async fn zero_byte_write_is_noop() {
        let mut s = session(Vec::new()).await;
        assert_eq!(s.write(&[]).await.unwrap(), 0);
        s.close().await.unwrap();
        assert!(s.get_ref().is_empty());
    }

    #[tokio::test]
    async fn close_emits_final_partial_chunk_once() {
        let mut s = session(RecordingSink::default()).await;
        s.write(b"hello").await.unwrap();
        s.close().await.unwrap();
        s.close().await.unwrap();
        let sink = s.get_ref();
        let chunks = frames(&sink.bytes);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ciphertext.len(), 5 + crate::crypto::TAG_LEN);
        assert_eq!(sink.shutdowns, 1);
    }

    #[tokio::test]
    async fn close_zeroizes_session_key() {
        let mut s = session(Vec::new()).await;
        assert!(!s.key.is_zeroed());
        s.write(b"data").await.unwrap();
        s.close().await.unwrap();
        assert_eq!(s.state(), StreamState::Closed);
        assert!(s.key.is_zeroed());
        assert!(s.cipher.is_none());
    }

    #[tokio::test]
    async fn write_after_close_is_configuration_error() {
        let mut s = session(Vec::new()).await;
        s.close().await.unwrap();
        assert!(matches!(
            s.write(b"late").await,
            Err(EnvelopeError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn failed_final_write_still_zeroizes_and_closes() {
        let mut s = session(BrokenSink).await;
        s.write(b"tail").await.unwrap();
        assert!(matches!(s.close().await, Err(EnvelopeError::Io(_))));
        assert_eq!(s.state(), StreamState::Closed);
        assert!(s.key.is_zeroed());
        assert!(matches!(
            s.close().await,
            Err(EnvelopeError::Configuration(_))
        ));
    }

    /// Sink that fails its first write, then accepts everything.
    #[derive(Default)]
    struct FailOnceSink {
        failed: bool,
        bytes: Vec<u8>,
    }

    impl AsyncWrite for FailOnceSink {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if !self.failed {
                self.failed = true;
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Interrupted, "blip")));
            }
            self.bytes.extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn failed_chunk_write_poisons_the_session() {
        let mut s = session(FailOnceSink::default()).await;
        assert!(s.write(&vec![7u8; CHUNK_SIZE]).await.is_err());
        assert_eq!(s.state(), StreamState::Closed);
        assert!(s.key.is_zeroed());
        assert!(s.pending.is_empty());

        assert!(matches!(
            s.write(b"tail").await,
            Err(EnvelopeError::Configuration(_))
        ));
        assert!(matches!(
            s.close().await,
            Err(EnvelopeError::Configuration(_))
        ));
        assert!(s.get_ref().bytes.is_empty());
    }

    #[tokio::test]
    async fn close_reentered_while_closing_fails() {
        let mut s = session(Vec::new()).await;
        s.write(b"partial").await.unwrap();
        // A cancelled close leaves the session mid-flush.
        s.state = StreamState::Closing;
        assert!(matches!(
            s.close().await,
            Err(EnvelopeError::Configuration(_))
        ));
        assert_eq!(s.state(), StreamState::Closed);
        assert!(s.key.is_zeroed());
        assert!(s.close().await.is_err());
        assert!(s.get_ref().is_empty());
    }

    #[tokio::test]
    async fn each_chunk_has_its_own_nonce() {
        let mut s = session(Vec::new()).await;
        s.write(&vec![0u8; CHUNK_SIZE * 3]).await.unwrap();
        s.close().await.unwrap();
        let chunks = frames(s.get_ref());
        assert_eq!(chunks.len(), 3);
        assert_ne!(chunks[0].nonce, chunks[1].nonce);
        assert_ne!(chunks[1].nonce, chunks[2].nonce);
        // Identical plaintext chunks must not produce identical ciphertext.
        assert_ne!(chunks[0].ciphertext, chunks[1].ciphertext);
    }
}
