//! End-to-end envelope and streaming behaviour against the local key provider.

use std::sync::Arc;

use envelope::{
    EncryptionContext, EnvelopeEncryptor, EnvelopeError, LocalKeyProvider, StreamState,
    CHUNK_SIZE,
};

const KEY_ID: &str = "alias/integration";

fn encryptor() -> EnvelopeEncryptor {
    let provider = LocalKeyProvider::new()
        .with_generated_key(KEY_ID)
        .unwrap();
    EnvelopeEncryptor::new(Arc::new(provider))
}

fn ctx(pairs: &[(&str, &str)]) -> EncryptionContext {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn one_byte_round_trip() {
    let enc = encryptor();
    let sealed = enc.encrypt(b"x", KEY_ID, &ctx(&[])).await.unwrap();
    assert_eq!(enc.decrypt(&sealed).await.unwrap(), b"x");
}

#[tokio::test]
async fn multi_megabyte_round_trip() {
    let enc = encryptor();
    let data = pattern(3 * 1024 * 1024 + 17);
    let sealed = enc
        .encrypt(&data, KEY_ID, &ctx(&[("tenant", "acme")]))
        .await
        .unwrap();
    assert_eq!(sealed.ciphertext.len(), data.len() + 16);
    assert_eq!(enc.decrypt(&sealed).await.unwrap(), data);
}

#[tokio::test]
async fn every_single_bit_flip_is_an_integrity_failure() {
    let enc = encryptor();
    let sealed = enc
        .encrypt(b"account=42", KEY_ID, &ctx(&[("purpose", "test")]))
        .await
        .unwrap();

    for byte in 0..sealed.ciphertext.len() {
        for bit in 0..8 {
            let mut tampered = sealed.clone();
            tampered.ciphertext[byte] ^= 1 << bit;
            let err = enc.decrypt(&tampered).await.unwrap_err();
            assert!(matches!(err, EnvelopeError::Integrity), "ciphertext {byte}:{bit}");
        }
    }
    for byte in 0..sealed.nonce.len() {
        for bit in 0..8 {
            let mut tampered = sealed.clone();
            tampered.nonce[byte] ^= 1 << bit;
            let err = enc.decrypt(&tampered).await.unwrap_err();
            assert!(matches!(err, EnvelopeError::Integrity), "nonce {byte}:{bit}");
        }
    }
    for byte in 0..sealed.wrapped_key.len() {
        for bit in 0..8 {
            let mut tampered = sealed.clone();
            tampered.wrapped_key[byte] ^= 1 << bit;
            let err = enc.decrypt(&tampered).await.unwrap_err();
            assert!(matches!(err, EnvelopeError::Integrity), "wrapped key {byte}:{bit}");
        }
    }
}

#[tokio::test]
async fn context_is_bound_to_the_data_key() {
    let enc = encryptor();
    let original = ctx(&[("tenant", "acme"), ("table", "users")]);
    let sealed = enc.encrypt(b"pii", KEY_ID, &original).await.unwrap();

    for changed in [
        ctx(&[("tenant", "acme")]),
        ctx(&[("tenant", "acme"), ("table", "orders")]),
        ctx(&[("tenant", "acme"), ("table", "users"), ("extra", "1")]),
        ctx(&[]),
    ] {
        let mut tampered = sealed.clone();
        tampered.context = changed;
        let err = enc.decrypt(&tampered).await.unwrap_err();
        assert!(matches!(err, EnvelopeError::Integrity));
    }
}

#[tokio::test]
async fn ciphertexts_differ_for_identical_input() {
    let enc = encryptor();
    let a = enc.encrypt(b"same", KEY_ID, &ctx(&[])).await.unwrap();
    let b = enc.encrypt(b"same", KEY_ID, &ctx(&[])).await.unwrap();
    assert_ne!(a.nonce, b.nonce);
    assert_ne!(a.wrapped_key, b.wrapped_key);
    assert_ne!(a.ciphertext, b.ciphertext);
}

#[tokio::test]
async fn streaming_matches_input_for_uneven_writes() {
    let enc = encryptor();
    let context = ctx(&[("object", "backup.tar")]);
    let data = pattern(1 + 100 + 70_000 + 1);

    let mut stream = enc
        .stream_encryptor(Vec::new(), KEY_ID, &context)
        .await
        .unwrap();
    let mut offset = 0;
    for len in [1, 100, 70_000, 1] {
        let written = stream.write(&data[offset..offset + len]).await.unwrap();
        assert_eq!(written, len);
        offset += len;
    }
    stream.close().await.unwrap();
    assert_eq!(stream.state(), StreamState::Closed);

    let expected_chunks = data.len().div_ceil(CHUNK_SIZE) as u64;
    assert_eq!(stream.chunks_written(), expected_chunks);

    let header = stream.header().clone();
    let framed = stream.get_ref().clone();

    let mut reader = enc.stream_decryptor(framed.as_slice(), &header).await.unwrap();
    assert_eq!(reader.read_to_end().await.unwrap(), data);
    assert_eq!(reader.chunks_read(), expected_chunks);
}

#[tokio::test]
async fn streaming_rejects_a_truncated_stream() {
    let enc = encryptor();
    let mut stream = enc
        .stream_encryptor(Vec::new(), KEY_ID, &ctx(&[]))
        .await
        .unwrap();
    stream.write(&pattern(CHUNK_SIZE + 10)).await.unwrap();
    stream.close().await.unwrap();

    let header = stream.header().clone();
    let mut framed = stream.get_ref().clone();
    framed.truncate(framed.len() - 5);

    let mut reader = enc.stream_decryptor(framed.as_slice(), &header).await.unwrap();
    let err = reader.read_to_end().await.unwrap_err();
    assert!(matches!(err, EnvelopeError::StreamTruncated { .. }));
}

#[tokio::test]
async fn closed_stream_refuses_writes_and_close_is_idempotent() {
    let enc = encryptor();
    let mut stream = enc
        .stream_encryptor(Vec::new(), KEY_ID, &ctx(&[]))
        .await
        .unwrap();
    stream.write(b"abc").await.unwrap();
    stream.close().await.unwrap();
    let after_first = stream.get_ref().len();

    stream.close().await.unwrap();
    assert_eq!(stream.get_ref().len(), after_first);
    assert!(stream.write(b"more").await.is_err());
}

#[tokio::test]
async fn disabled_provider_is_a_configuration_error() {
    let provider = LocalKeyProvider::new()
        .with_generated_key(KEY_ID)
        .unwrap()
        .enabled(false);
    let enc = EnvelopeEncryptor::new(Arc::new(provider));
    let err = enc.encrypt(b"x", KEY_ID, &ctx(&[])).await.unwrap_err();
    assert!(matches!(err, EnvelopeError::Configuration(_)));
}
