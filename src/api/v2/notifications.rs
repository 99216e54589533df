//! Notification send and lookup endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::info;
use uuid::Uuid;

use crate::api::middleware::BearerToken;
use crate::api::state::AppState;
use crate::api::types::{
    ApiError, Json, NotificationResponse, SendEmailRequest, SendSmsRequest,
};
use crate::domain::notification::{DispatchOutcome, DispatchRequest};

/// POST /v2/notifications/sms
pub async fn send_sms(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(request): Json<SendSmsRequest>,
) -> Result<Response, ApiError> {
    request.validate()?;
    dispatch(&state, &token, request.into_dispatch_request()).await
}

/// POST /v2/notifications/email
pub async fn send_email(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Json(request): Json<SendEmailRequest>,
) -> Result<Response, ApiError> {
    request.validate()?;
    dispatch(&state, &token, request.into_dispatch_request()).await
}

/// GET /v2/notifications/{notification_id}
pub async fn get_notification(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    Path(notification_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state
        .dispatch_service
        .authenticate(&token)
        .await
        .map_err(|err| ApiError::unauthorized(err.to_string()).with_reason(err.reason_code()))?;

    let recorded = state
        .recorder
        .get(notification_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Notification not found"))?;

    Ok((StatusCode::OK, Json(recorded)).into_response())
}

async fn dispatch(
    state: &AppState,
    token: &str,
    request: DispatchRequest,
) -> Result<Response, ApiError> {
    info!(
        notification_id = %request.id,
        channel = %request.channel,
        "processing notification request"
    );

    // The outcome needs request metadata for the response body, but the
    // pipeline owns the request once handed over
    let response_meta = request.clone();
    let outcome = state.dispatch_service.handle(token, request).await;

    match outcome {
        DispatchOutcome::Completed(_) => {
            let body = NotificationResponse::completed(&response_meta, &outcome);
            Ok((StatusCode::CREATED, Json(body)).into_response())
        }
        DispatchOutcome::Rejected(reason) => Err(reason.into()),
    }
}
