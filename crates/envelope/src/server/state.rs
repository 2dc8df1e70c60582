//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::envelope::EnvelopeEncryptor;

use super::docs::ApiDocs;

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable (`Arc`-wrapped or already `Arc`-backed) so
/// that Axum can clone the state for each request without copying expensive data.
#[derive(Clone)]
pub struct AppState {
    /// Envelope encryptor over the configured key provider.
    pub encryptor: EnvelopeEncryptor,
    /// Key ID used when a request does not name one.
    pub default_key_id: Option<Arc<str>>,
    /// Parsed API documentation assets.
    pub docs: Arc<ApiDocs>,
    /// Largest accepted request body, in bytes.
    pub max_request_bytes: usize,
}

impl AppState {
    /// Create a new [`AppState`].
    pub fn new(
        encryptor: EnvelopeEncryptor,
        default_key_id: Option<String>,
        docs: ApiDocs,
        max_request_bytes: usize,
    ) -> Self {
        Self {
            encryptor,
            default_key_id: default_key_id.map(Arc::from),
            docs: Arc::new(docs),
            max_request_bytes,
        }
    }
}
