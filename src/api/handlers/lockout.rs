//! Endpoints called by the host application's login route.
//!
//! Flow Overview:
//! 1) Before checking a password: `POST /v1/lockout/status`; deny if `locked`.
//! 2) Wrong password: `POST /v1/lockout/failures`.
//! 3) Correct password: `POST /v1/lockout/success`.
//!
//! Any 5xx from these endpoints means the login must be denied.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use super::types::{EmailRequest, FailedAttemptRequest, LockoutStatusResponse};
use super::{
    MAX_USER_AGENT_LENGTH, extract_client_ip, extract_user_agent, missing_payload,
    security_error_response, truncate,
};
use crate::security::SecurityService;

/// Report whether the account may attempt a login.
#[utoipa::path(
    post,
    path = "/v1/lockout/status",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Current lockout status", body = LockoutStatusResponse),
        (status = 400, description = "Missing payload or invalid email", body = String),
        (status = 503, description = "Status unavailable; deny the login", body = String)
    ),
    tag = "lockout"
)]
pub async fn lockout_status(
    headers: HeaderMap,
    service: Extension<Arc<SecurityService>>,
    payload: Option<Json<EmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let client_ip = extract_client_ip(&headers);
    match service
        .check_lockout_status(&request.email, client_ip.as_deref())
        .await
    {
        Ok(status) => (
            StatusCode::OK,
            Json(LockoutStatusResponse::from_status(status, service.now())),
        )
            .into_response(),
        Err(err) => security_error_response(&err),
    }
}

/// Count a failed password check for the account.
#[utoipa::path(
    post,
    path = "/v1/lockout/failures",
    request_body = FailedAttemptRequest,
    responses(
        (status = 200, description = "Failure recorded; status after recording", body = LockoutStatusResponse),
        (status = 400, description = "Missing payload or invalid email", body = String),
        (status = 503, description = "Failure not recorded; deny the login", body = String)
    ),
    tag = "lockout"
)]
pub async fn record_failure(
    headers: HeaderMap,
    service: Extension<Arc<SecurityService>>,
    payload: Option<Json<FailedAttemptRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let client_ip = extract_client_ip(&headers);
    let user_agent = request
        .user_agent
        .as_deref()
        .map(|value| truncate(value.trim(), MAX_USER_AGENT_LENGTH))
        .or_else(|| extract_user_agent(&headers));

    match service
        .record_failed_attempt(&request.email, client_ip.as_deref(), user_agent.as_deref())
        .await
    {
        Ok(status) => (
            StatusCode::OK,
            Json(LockoutStatusResponse::from_status(status, service.now())),
        )
            .into_response(),
        Err(err) => security_error_response(&err),
    }
}

/// Clear the account's failed attempts after a successful login.
#[utoipa::path(
    post,
    path = "/v1/lockout/success",
    request_body = EmailRequest,
    responses(
        (status = 204, description = "Attempts cleared"),
        (status = 400, description = "Missing payload or invalid email", body = String),
        (status = 503, description = "Attempts not cleared", body = String)
    ),
    tag = "lockout"
)]
pub async fn record_success(
    headers: HeaderMap,
    service: Extension<Arc<SecurityService>>,
    payload: Option<Json<EmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let client_ip = extract_client_ip(&headers);
    match service
        .clear_lockout(&request.email, client_ip.as_deref())
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => security_error_response(&err),
    }
}
