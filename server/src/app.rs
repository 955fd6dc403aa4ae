//! HTTP router.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{ingress, ws};

/// Builds the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/sessions/{session_id}/listen", get(ws::listen))
        .route(
            "/v1/sessions/{session_id}/segments",
            post(ingress::on_committed_segment),
        )
        .route("/v1/sessions/{session_id}/end", post(ingress::end_session))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
