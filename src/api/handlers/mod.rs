//! Route handlers and the helpers they share.
//!
//! Storage failures are answered with a generic 503 so a caller cannot tell
//! an outage apart from other denials, and the login route fails closed.

pub mod admin;
pub mod health;
pub mod lockout;
pub mod types;
pub mod verification;


use axum::{
    http::{HeaderMap, StatusCode, header::AUTHORIZATION, header::USER_AGENT},
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error};

use crate::security::SecurityError;

pub(crate) const GENERIC_FAILURE: &str = "Please try again later";
const MAX_USER_AGENT_LENGTH: usize = 512;

/// Bearer token that unlocks the admin routes. `None` keeps them closed.
#[derive(Debug, Default)]
pub struct AdminGuard {
    token: Option<SecretString>,
}

impl AdminGuard {
    #[must_use]
    pub fn new(token: Option<SecretString>) -> Self {
        let token = token.filter(|token| !token.expose_secret().is_empty());
        Self { token }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    /// Check the `Authorization: Bearer` header against the configured token.
    ///
    /// # Errors
    /// `StatusCode::UNAUTHORIZED` when the admin API is disabled, the header is
    /// missing or the token does not match.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), StatusCode> {
        let expected = self.token.as_ref().ok_or(StatusCode::UNAUTHORIZED)?;
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(StatusCode::UNAUTHORIZED)?;

        if constant_time_eq(presented.as_bytes(), expected.expose_secret().as_bytes()) {
            Ok(())
        } else {
            debug!("Rejected admin request with invalid token");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Map a security error to its HTTP answer.
pub(crate) fn security_error_response(err: &SecurityError) -> Response {
    match err {
        SecurityError::InvalidIdentity(reason) => {
            debug!("Rejected request: {reason}");
            (StatusCode::BAD_REQUEST, "Invalid email".to_string()).into_response()
        }
        SecurityError::StorageUnavailable(reason) => {
            error!("Login security storage unavailable: {reason}");
            (StatusCode::SERVICE_UNAVAILABLE, GENERIC_FAILURE.to_string()).into_response()
        }
    }
}

pub(crate) fn missing_payload() -> Response {
    (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response()
}

/// Client IP as reported by the reverse proxy.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|value| truncate(value.trim(), MAX_USER_AGENT_LENGTH))
        .filter(|value| !value.is_empty())
}

pub(crate) fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod helper_tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn extract_client_ip_none_when_missing() {
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn user_agent_is_truncated() -> anyhow::Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(&"x".repeat(2048))?);
        assert_eq!(extract_user_agent(&headers).map(|ua| ua.len()), Some(512));
        Ok(())
    }

    #[test]
    fn admin_guard_disabled_rejects_everything() {
        let guard = AdminGuard::new(None);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer anything"));
        assert!(!guard.is_enabled());
        assert_eq!(guard.authorize(&headers), Err(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn admin_guard_empty_token_counts_as_disabled() {
        let guard = AdminGuard::new(Some(SecretString::from(String::new())));
        assert!(!guard.is_enabled());
    }

    #[test]
    fn admin_guard_checks_bearer_token() {
        let guard = AdminGuard::new(Some(SecretString::from("s3cret".to_string())));

        let mut headers = HeaderMap::new();
        assert_eq!(guard.authorize(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer wrong"));
        assert_eq!(guard.authorize(&headers), Err(StatusCode::UNAUTHORIZED));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(guard.authorize(&headers), Ok(()));
    }

    #[test]
    fn storage_errors_map_to_generic_503() {
        let response =
            security_error_response(&SecurityError::StorageUnavailable("down".to_string()));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response =
            security_error_response(&SecurityError::InvalidIdentity("bad".to_string()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
