//! Configuration loading and validation for the envelope service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::kms::PlaintextKey;

/// Which [`crate::kms::KeyProvider`] backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyProviderKind {
    /// AWS KMS via the default credential chain.
    AwsKms,
    /// In-process master key; development and testing only.
    Local,
}

/// Validated service configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Key provider backend.
    #[serde(default = "default_key_provider")]
    pub key_provider: KeyProviderKind,

    /// When `false`, every encrypt/decrypt request fails as unconfigured.
    #[serde(default = "default_kms_enabled")]
    pub kms_enabled: bool,

    /// Optional KMS endpoint override.
    #[serde(default)]
    pub kms_endpoint_url: Option<String>,

    /// Key ID used when a request does not name one.
    #[serde(default)]
    pub default_key_id: Option<String>,

    /// Base64 of the 32-byte master key. **Required** for the local provider.
    #[serde(default)]
    pub local_master_key: Option<String>,

    /// Key ID the local master key is registered under.
    #[serde(default = "default_local_key_id")]
    pub local_key_id: String,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Largest accepted request body, in bytes.
    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    /// OTLP endpoint. Spans are exported only when set.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_key_provider() -> KeyProviderKind {
    KeyProviderKind::AwsKms
}
fn default_kms_enabled() -> bool {
    true
}
fn default_local_key_id() -> String {
    "local".into()
}
fn default_listen_port() -> u16 {
    8080
}
fn default_max_request_bytes() -> usize {
    8 * 1024 * 1024
}
fn default_log_level() -> String {
    "info".into()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("key_provider", &self.key_provider)
            .field("kms_enabled", &self.kms_enabled)
            .field("kms_endpoint_url", &self.kms_endpoint_url)
            .field("default_key_id", &self.default_key_id)
            .field("local_master_key", &self.local_master_key.as_ref().map(|_| "[REDACTED]"))
            .field("local_key_id", &self.local_key_id)
            .field("listen_port", &self.listen_port)
            .field("max_request_bytes", &self.max_request_bytes)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish()
    }
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Decode the local master key.
    ///
    /// # Errors
    ///
    /// Returns an error if `LOCAL_MASTER_KEY` is absent, not base64, or not 32 bytes.
    pub fn local_master_key(&self) -> Result<PlaintextKey> {
        let encoded = self
            .local_master_key
            .as_deref()
            .context("LOCAL_MASTER_KEY is required when KEY_PROVIDER=local")?;
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded.trim())
                .context("LOCAL_MASTER_KEY must be base64")?,
        );
        PlaintextKey::from_slice(&decoded).context("LOCAL_MASTER_KEY must decode to 32 bytes")
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if let Some(id) = &self.default_key_id {
            ensure_non_empty(id, "DEFAULT_KEY_ID")?;
        }
        if let Some(url) = &self.kms_endpoint_url {
            ensure_non_empty(url, "KMS_ENDPOINT_URL")?;
        }
        if self.key_provider == KeyProviderKind::Local {
            ensure_non_empty(&self.local_key_id, "LOCAL_KEY_ID")?;
            self.local_master_key()?;
        }
        if self.max_request_bytes == 0 {
            anyhow::bail!("MAX_REQUEST_BYTES must be > 0");
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} must not be empty when set");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            key_provider: default_key_provider(),
            kms_enabled: default_kms_enabled(),
            kms_endpoint_url: None,
            default_key_id: Some("alias/pii".into()),
            local_master_key: None,
            local_key_id: default_local_key_id(),
            listen_port: default_listen_port(),
            max_request_bytes: default_max_request_bytes(),
            otel_exporter_otlp_endpoint: None,
            log_level: default_log_level(),
        }
    }

    #[test]
    fn defaults_are_correct() {
        assert_eq!(default_key_provider(), KeyProviderKind::AwsKms);
        assert!(default_kms_enabled());
        assert_eq!(default_local_key_id(), "local");
        assert_eq!(default_listen_port(), 8080);
        assert_eq!(default_max_request_bytes(), 8 * 1024 * 1024);
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn validate_accepts_aws_defaults() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_default_key_id() {
        let cfg = Config {
            default_key_id: Some("  ".into()),
            ..base()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn local_provider_requires_master_key() {
        let cfg = Config {
            key_provider: KeyProviderKind::Local,
            ..base()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn local_master_key_must_be_32_bytes() {
        let cfg = Config {
            key_provider: KeyProviderKind::Local,
            local_master_key: Some(STANDARD.encode([7u8; 16])),
            ..base()
        };
        assert!(cfg.validate().is_err());

        let cfg = Config {
            key_provider: KeyProviderKind::Local,
            local_master_key: Some(STANDARD.encode([7u8; 32])),
            ..base()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.local_master_key().unwrap().as_bytes(), &[7u8; 32]);
    }

    #[test]
    fn validate_rejects_zero_body_limit() {
        let cfg = Config {
            max_request_bytes: 0,
            ..base()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_redacts_master_key() {
        let cfg = Config {
            local_master_key: Some("c2VjcmV0".into()),
            ..base()
        };
        let shown = format!("{cfg:?}");
        assert!(shown.contains("[REDACTED]"));
        assert!(!shown.contains("c2VjcmV0"));
    }

    #[test]
    fn provider_kind_parses_kebab_case() {
        let kind: KeyProviderKind = serde_json::from_str("\"aws-kms\"").unwrap();
        assert_eq!(kind, KeyProviderKind::AwsKms);
        let kind: KeyProviderKind = serde_json::from_str("\"local\"").unwrap();
        assert_eq!(kind, KeyProviderKind::Local);
    }
}
