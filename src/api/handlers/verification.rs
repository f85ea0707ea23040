//! Gate for issuing email verification codes.
//!
//! The host application calls this before sending a code; only a 202 means
//! it may send one. Limits are per normalized email and fixed-window.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{EmailRequest, VerificationRequestResponse};
use super::{extract_client_ip, missing_payload, security_error_response};
use crate::security::{Identity, RateLimitDecision, RateLimiter};

pub(crate) fn verification_key(identity: &Identity) -> String {
    format!("verification:{identity}")
}

/// Ask whether a verification code may be issued for the email.
#[utoipa::path(
    post,
    path = "/v1/verification/requests",
    request_body = EmailRequest,
    responses(
        (status = 202, description = "Code may be issued", body = VerificationRequestResponse),
        (status = 400, description = "Missing payload or invalid email", body = String),
        (status = 429, description = "Rate limited; see Retry-After", body = VerificationRequestResponse)
    ),
    tag = "verification"
)]
pub async fn request_verification(
    headers: HeaderMap,
    limiter: Extension<Arc<RateLimiter>>,
    payload: Option<Json<EmailRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    let identity = match Identity::parse(&request.email) {
        Ok(identity) => identity,
        Err(err) => return security_error_response(&err),
    };

    let key = verification_key(&identity);
    let decision = limiter.check(&key);
    let reset_in = limiter.time_until_reset(&key);
    let body = VerificationRequestResponse {
        allowed: decision == RateLimitDecision::Allowed,
        remaining_attempts: limiter.remaining_attempts(&key),
        reset_in_seconds: reset_in.as_secs(),
    };

    match decision {
        RateLimitDecision::Allowed => {
            debug!(
                remaining = body.remaining_attempts,
                "Verification request allowed"
            );
            (StatusCode::ACCEPTED, Json(body)).into_response()
        }
        RateLimitDecision::Limited => {
            let client_ip = extract_client_ip(&headers);
            warn!(
                ip = client_ip.as_deref().unwrap_or("-"),
                "Verification requests rate limited"
            );
            // Round up so a client never retries a moment too early.
            let retry_after = reset_in.as_secs() + u64::from(reset_in.subsec_nanos() > 0);
            let mut response_headers = HeaderMap::new();
            response_headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
            (StatusCode::TOO_MANY_REQUESTS, response_headers, Json(body)).into_response()
        }
    }
}
