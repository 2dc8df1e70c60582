//! Structured logging and optional OpenTelemetry span export.
//!
//! # Telemetry invariants
//!
//! - **No plaintext or key material** (plaintext or wrapped) may appear in any
//!   span attribute or log field. Sizes, key IDs, context key names and chunk
//!   counts are fine.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`), overridden
//!   by `RUST_LOG` when set.

pub mod init;

pub use init::init_telemetry;
