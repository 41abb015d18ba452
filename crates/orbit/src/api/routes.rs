//! Route definitions.

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;
use crate::ws::ws_handler;

/// Create the application router.
///
/// The WebSocket endpoint answers on both `/ws` and `/`.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws", get(ws_handler))
        .route("/", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("CORS: ignoring invalid origin {:?}", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        tracing::debug!("CORS: no origins configured, denying cross-origin requests");
        return CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")));
    }

    tracing::info!("CORS: allowing {} configured origin(s)", origins.len());
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
}
