use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::state::AppState;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Stream attachment (ingestion seam)
        .route("/streams", post(handlers::attach_stream))
        .route("/streams", get(handlers::list_streams))
        .route("/streams/:app/:name", delete(handlers::detach_stream))
        // Recording control
        .route(
            "/streams/:app/:name/record/start",
            post(handlers::start_recording),
        )
        .route(
            "/streams/:app/:name/record/stop",
            post(handlers::stop_recording),
        )
        .route(
            "/streams/:app/:name/record/status",
            get(handlers::recording_status),
        )
        .route(
            "/streams/:app/:name/record/validate",
            post(handlers::validate_recording),
        )
        // Bulk control
        .route("/record/start-all", post(handlers::start_all))
        .route("/record/stop-all", post(handlers::stop_all))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
