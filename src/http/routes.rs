use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/sessions/record/start", post(handlers::start_recording))
        .route(
            "/sessions/record/stop/:session_id",
            post(handlers::stop_recording),
        )
        // Session queries
        .route("/sessions", get(handlers::list_sessions))
        .route(
            "/sessions/:session_id",
            axum::routing::delete(handlers::release_session),
        )
        .route(
            "/sessions/:session_id/status",
            get(handlers::get_session_status),
        )
        .route(
            "/sessions/:session_id/error",
            get(handlers::get_session_error),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
