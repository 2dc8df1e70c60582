//! [`AwsKmsProvider`]: data keys issued and unwrapped by AWS KMS.

use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_kms::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::DataKeySpec;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

use super::{DataKey, EncryptionContext, KeyProvider, KeyProviderError, PlaintextKey};

/// KMS-backed [`KeyProvider`].
///
/// `GenerateDataKey` is called with the `AES_256` key spec and the caller's
/// encryption context; `Decrypt` presents the stored context, which KMS
/// checks before releasing the plaintext.
#[derive(Clone)]
pub struct AwsKmsProvider {
    client: aws_sdk_kms::Client,
    enabled: bool,
}

impl AwsKmsProvider {
    /// Wrap an existing KMS client.
    pub fn new(client: aws_sdk_kms::Client, enabled: bool) -> Self {
        Self { client, enabled }
    }

    /// Build a client from the standard AWS credential and region chain.
    ///
    /// `endpoint_url` overrides the KMS endpoint (e.g. a VPC endpoint or a
    /// local emulator).
    ///
    /// # Errors
    ///
    /// Returns an error if the SDK config cannot be loaded.
    pub async fn from_env(endpoint_url: Option<&str>, enabled: bool) -> Result<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;

        let mut builder = aws_sdk_kms::config::Builder::from(&config);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url);
        }

        Ok(Self::new(
            aws_sdk_kms::Client::from_conf(builder.build()),
            enabled,
        ))
    }
}

#[async_trait]
impl KeyProvider for AwsKmsProvider {
    fn name(&self) -> &'static str {
        "aws-kms"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[instrument(skip_all, fields(key_id = %key_id))]
    async fn generate_data_key(
        &self,
        key_id: &str,
        context: &EncryptionContext,
    ) -> Result<DataKey, KeyProviderError> {
        if !self.enabled {
            return Err(KeyProviderError::Disabled);
        }

        let resp = self
            .client
            .generate_data_key()
            .key_id(key_id)
            .key_spec(DataKeySpec::Aes256)
            .set_encryption_context(non_empty(context))
            .send()
            .await
            .map_err(classify)?;

        let plaintext = resp
            .plaintext
            .map(|blob| Zeroizing::new(blob.into_inner()))
            .ok_or_else(|| {
                KeyProviderError::Unavailable("GenerateDataKey response contained no plaintext".into())
            })?;
        let wrapped = resp
            .ciphertext_blob
            .map(Blob::into_inner)
            .ok_or_else(|| {
                KeyProviderError::Unavailable(
                    "GenerateDataKey response contained no ciphertext blob".into(),
                )
            })?;

        debug!(wrapped_len = wrapped.len(), "data key issued by KMS");
        Ok(DataKey::new(PlaintextKey::from_slice(&plaintext)?, wrapped))
    }

    #[instrument(skip_all)]
    async fn decrypt_data_key(
        &self,
        wrapped_key: &[u8],
        context: &EncryptionContext,
    ) -> Result<PlaintextKey, KeyProviderError> {
        if !self.enabled {
            return Err(KeyProviderError::Disabled);
        }

        let resp = self
            .client
            .decrypt()
            .ciphertext_blob(Blob::new(wrapped_key))
            .set_encryption_context(non_empty(context))
            .send()
            .await
            .map_err(classify)?;

        let plaintext = resp
            .plaintext
            .map(|blob| Zeroizing::new(blob.into_inner()))
            .ok_or_else(|| {
                KeyProviderError::Unavailable("KMS decrypt response contained no plaintext".into())
            })?;

        PlaintextKey::from_slice(&plaintext)
    }
}

/// KMS rejects an empty context map on some operations; send none instead.
fn non_empty(context: &EncryptionContext) -> Option<EncryptionContext> {
    (!context.is_empty()).then(|| context.clone())
}

/// Map a KMS SDK failure onto the provider error taxonomy by error code.
fn classify<E, R>(err: SdkError<E, R>) -> KeyProviderError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = || err.message().unwrap_or("no message").to_owned();
    match err.code() {
        Some(code) => classify_code(code, message()),
        None => KeyProviderError::Unavailable(DisplayErrorContext(&err).to_string()),
    }
}

fn classify_code(code: &str, message: String) -> KeyProviderError {
    match code {
        "InvalidCiphertextException" | "IncorrectKeyException" => {
            KeyProviderError::InvalidCiphertext
        }
        "NotFoundException" => KeyProviderError::NotFound(message),
        "AccessDeniedException" | "InvalidKeyUsageException" => {
            KeyProviderError::AccessDenied(message)
        }
        "InvalidGrantTokenException" | "ValidationException" => {
            KeyProviderError::InvalidContext(message)
        }
        other => KeyProviderError::Unavailable(format!("{other}: {message}")),
    }
}
