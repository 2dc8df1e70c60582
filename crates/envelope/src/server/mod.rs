//! Axum HTTP server, routing, and middleware.
//!
//! # Responsibilities
//! - Expose one-shot encrypt/decrypt over JSON with base64 binary fields.
//! - Serve a health endpoint and the static API documentation.
//! - Inject shared application state (`AppState`) into handlers.

pub mod docs;
pub mod handlers;
pub mod router;
pub mod state;
