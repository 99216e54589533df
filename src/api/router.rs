use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::health;
use super::state::AppState;
use super::v2;

/// Create the full router with application state
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        // Legacy-compatible v2 API
        .nest("/v2/notifications", v2::create_notifications_router())
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
