//! Axum router construction.

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};

use super::{docs, handlers, state::AppState};

/// Per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the application [`Router`] with all routes and middleware attached.
pub fn build(state: AppState) -> Router {
    let body_limit = state.max_request_bytes;
    Router::new()
        .route("/v1/encrypt", post(handlers::encrypt))
        .route("/v1/decrypt", post(handlers::decrypt))
        .route("/health", get(handlers::health))
        .route(docs::DOCS_PREFIX, get(docs::serve))
        .route(&format!("{}/*path", docs::DOCS_PREFIX), get(docs::serve))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CompressionLayer::new())
        .with_state(state)
}
