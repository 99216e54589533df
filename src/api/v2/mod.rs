//! Legacy-compatible v2 notification endpoints

pub mod notifications;

use axum::{
    routing::{get, post},
    Router,
};

use super::state::AppState;

pub fn create_notifications_router() -> Router<AppState> {
    Router::new()
        .route("/sms", post(notifications::send_sms))
        .route("/email", post(notifications::send_email))
        .route("/{notification_id}", get(notifications::get_notification))
}
