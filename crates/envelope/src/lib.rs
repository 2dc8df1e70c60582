//! Envelope encryption over externally issued data keys.
//!
//! A [`KeyProvider`] issues a fresh 256-bit data key per operation and keeps
//! its wrapped form. Content is sealed locally with AES-256-GCM-SIV, either in
//! one shot through [`EnvelopeEncryptor::encrypt`] or as a framed chunk stream
//! through [`StreamEncryptor`]. Plaintext key material is zeroized on release.

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod kms;
pub mod server;
pub mod stream;
pub mod telemetry;

pub use envelope::{EncryptedData, EnvelopeEncryptor};
pub use error::EnvelopeError;
pub use kms::{
    AwsKmsProvider, DataKey, EncryptionContext, KeyProvider, KeyProviderError, LocalKeyProvider,
    PlaintextKey,
};
pub use stream::{StreamDecryptor, StreamEncryptor, StreamHeader, StreamState, CHUNK_SIZE};
