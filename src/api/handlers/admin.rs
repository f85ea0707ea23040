//! Admin tooling: inspect, list and clear lockouts.
//!
//! Every route checks the bearer token before touching the store.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use std::sync::Arc;

use super::types::{EmailRequest, LockedAccountsResponse, LockoutInfoResponse};
use super::{AdminGuard, extract_client_ip, missing_payload, security_error_response};
use crate::security::SecurityService;

fn unauthorized() -> axum::response::Response {
    (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response()
}

/// Full attempt details for an email, or an explicit "not tracked" body.
#[utoipa::path(
    post,
    path = "/v1/admin/lockouts/info",
    request_body = EmailRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer admin token")
    ),
    responses(
        (status = 200, description = "Lockout details", body = LockoutInfoResponse),
        (status = 400, description = "Missing payload or invalid email", body = String),
        (status = 401, description = "Missing or invalid admin token", body = String),
        (status = 503, description = "Store unavailable", body = String)
    ),
    tag = "admin"
)]
pub async fn lockout_info(
    headers: HeaderMap,
    service: Extension<Arc<SecurityService>>,
    guard: Extension<Arc<AdminGuard>>,
    payload: Option<Json<EmailRequest>>,
) -> impl IntoResponse {
    if guard.authorize(&headers).is_err() {
        return unauthorized();
    }
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let client_ip = extract_client_ip(&headers);
    match service
        .get_lockout_info(&request.email, client_ip.as_deref())
        .await
    {
        Ok(info) => {
            let response = LockoutInfoResponse::from_info(info, service.policy().max_attempts());
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => security_error_response(&err),
    }
}

/// Remove the lockout and attempt history for an email.
#[utoipa::path(
    post,
    path = "/v1/admin/lockouts/clear",
    request_body = EmailRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer admin token")
    ),
    responses(
        (status = 204, description = "Lockout cleared"),
        (status = 400, description = "Missing payload or invalid email", body = String),
        (status = 401, description = "Missing or invalid admin token", body = String),
        (status = 503, description = "Store unavailable", body = String)
    ),
    tag = "admin"
)]
pub async fn clear_lockout(
    headers: HeaderMap,
    service: Extension<Arc<SecurityService>>,
    guard: Extension<Arc<AdminGuard>>,
    payload: Option<Json<EmailRequest>>,
) -> impl IntoResponse {
    if guard.authorize(&headers).is_err() {
        return unauthorized();
    }
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

/// Accounts currently locked, soonest expiry first.
#[utoipa::path(
    get,
    path = "/v1/admin/lockouts",
    params(
        ("Authorization" = String, Header, description = "Bearer admin token")
    ),
    responses(
        (status = 200, description = "Active lockouts", body = LockedAccountsResponse),
        (status = 401, description = "Missing or invalid admin token", body = String),
        (status = 503, description = "Store unavailable", body = String)
    ),
    tag = "admin"
)]
pub async fn locked_accounts(
    headers: HeaderMap,
    service: Extension<Arc<SecurityService>>,
    guard: Extension<Arc<AdminGuard>>,
) -> impl IntoResponse {
    if guard.authorize(&headers).is_err() {
        return unauthorized();
    }

    match service.locked_accounts().await {
        Ok(accounts) => {
            let response = LockedAccountsResponse {
                accounts: accounts.into_iter().map(LockoutInfoResponse::from).collect(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => security_error_response(&err),
    }
}
