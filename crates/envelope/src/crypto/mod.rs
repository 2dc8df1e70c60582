//! AES-256-GCM-SIV content encryption and the chunk wire format.
//!
//! This module is free of AWS and HTTP dependencies. It knows nothing about
//! where a key came from; the envelope and stream layers own key lifetimes.
//!
//! # Chunk format
//!
//! ```text
//! [u32 big-endian length][12-byte nonce][ciphertext + 16-byte tag]
//! ```
//!
//! `length` covers the nonce and ciphertext and never exceeds
//! [`framing::MAX_FRAME_LEN`].

pub mod cipher;
pub mod framing;

pub use cipher::{ContentCipher, Sealed, KEY_LEN, NONCE_LEN, TAG_LEN};
pub use framing::{Chunk, ChunkCodec, FrameError, MAX_FRAME_LEN};
