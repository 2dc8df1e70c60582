//! Axum request handlers for all service endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::protocol::{
    DecryptResponse, EncryptRequest, EnvelopeBody, ErrorResponse, HealthResponse,
};
use common::ServiceError;
use tracing::warn;

use super::state::AppState;
use crate::envelope::EncryptedData;
use crate::error::EnvelopeError;

/// [`ServiceError`] rendered as a JSON [`ErrorResponse`] with its HTTP status.
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl From<EnvelopeError> for ApiError {
    fn from(err: EnvelopeError) -> Self {
        if !matches!(err, EnvelopeError::Validation(_) | EnvelopeError::Integrity) {
            warn!(error = %err, "envelope operation failed");
        }
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self.0))).into_response()
    }
}

/// `POST /v1/encrypt`: envelope-encrypt a base64 payload.
///
/// Uses the request's `key_id`, or the configured default key when absent.
pub async fn encrypt(
    State(state): State<AppState>,
    Json(req): Json<EncryptRequest>,
) -> Result<Json<EnvelopeBody>, ApiError> {
    let key_id = req
        .key_id
        .as_deref()
        .or(state.default_key_id.as_deref())
        .ok_or_else(|| ServiceError::BadRequest("key_id is required".into()))?;
    let plaintext = decode_field("plaintext", &req.plaintext)?;

    let encrypted = state.encryptor.encrypt(&plaintext, key_id, &req.context).await?;
    Ok(Json(to_body(encrypted)))
}

/// `POST /v1/decrypt`: open an envelope produced by `/v1/encrypt`.
pub async fn decrypt(
    State(state): State<AppState>,
    Json(body): Json<EnvelopeBody>,
) -> Result<Json<DecryptResponse>, ApiError> {
    let encrypted = from_body(body)?;
    let plaintext = state.encryptor.decrypt(&encrypted).await?;
    Ok(Json(DecryptResponse {
        plaintext: STANDARD.encode(plaintext),
    }))
}

/// `GET /health`: liveness and readiness check.
///
/// Returns `200 OK` when the key provider is enabled, `503` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let provider = state.encryptor.provider();
    let kms_enabled = provider.is_enabled();

    let (status_code, status_str) = if kms_enabled {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        key_provider: provider.name().into(),
        kms_enabled,
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

// ---------------------------------------------------------------------------
// Base64 conversion helpers
// ---------------------------------------------------------------------------

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, ServiceError> {
    STANDARD
        .decode(value)
        .map_err(|_| ServiceError::BadRequest(format!("{name} is not valid base64")))
}

fn to_body(data: EncryptedData) -> EnvelopeBody {
    EnvelopeBody {
        wrapped_key: STANDARD.encode(&data.wrapped_key),
        ciphertext: STANDARD.encode(&data.ciphertext),
        nonce: STANDARD.encode(&data.nonce),
        context: data.context,
    }
}

fn from_body(body: EnvelopeBody) -> Result<EncryptedData, ServiceError> {
    Ok(EncryptedData {
        wrapped_key: decode_field("wrapped_key", &body.wrapped_key)?,
        ciphertext: decode_field("ciphertext", &body.ciphertext)?,
        nonce: decode_field("nonce", &body.nonce)?,
        context: body.context,
    })
}
