//! Request/response types for lockout, verification and admin endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::security::{AttemptDetails, LockoutInfo, LockoutStatus};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FailedAttemptRequest {
    pub email: String,
    /// Overrides the `User-Agent` header when the caller proxies a browser login.
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct LockoutStatusResponse {
    pub locked: bool,
    pub lockout_until: Option<DateTime<Utc>>,
    pub retry_after_seconds: Option<u64>,
    pub remaining_attempts: u32,
}

impl LockoutStatusResponse {
    pub(crate) fn from_status(status: LockoutStatus, now: DateTime<Utc>) -> Self {
        let retry_after_seconds = status.lockout_until.map(|until| {
            let seconds = until.signed_duration_since(now).num_seconds().max(0);
            u64::try_from(seconds).unwrap_or(0)
        });
        Self {
            locked: status.locked,
            lockout_until: status.lockout_until,
            retry_after_seconds,
            remaining_attempts: status.remaining_attempts,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct LockoutInfoResponse {
    /// False when no failed attempts are on record for the email.
    pub tracked: bool,
    pub locked: bool,
    pub identity: String,
    pub failed_attempts: u32,
    pub remaining_attempts: u32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl LockoutInfoResponse {
    pub(crate) fn from_info(info: LockoutInfo, max_attempts: u32) -> Self {
        match info {
            LockoutInfo::NotLocked { identity } => Self {
                tracked: false,
                locked: false,
                identity,
                failed_attempts: 0,
                remaining_attempts: max_attempts,
                lockout_until: None,
                last_attempt_at: None,
                ip_address: None,
                user_agent: None,
            },
            LockoutInfo::Attempts(details) => details.into(),
        }
    }
}

impl From<AttemptDetails> for LockoutInfoResponse {
    fn from(details: AttemptDetails) -> Self {
        Self {
            tracked: true,
            locked: details.locked,
            identity: details.identity,
            failed_attempts: details.failed_attempts,
            remaining_attempts: details.remaining_attempts,
            lockout_until: details.lockout_until,
            last_attempt_at: Some(details.last_attempt_at),
            ip_address: details.ip_address,
            user_agent: details.user_agent,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LockedAccountsResponse {
    pub accounts: Vec<LockoutInfoResponse>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct VerificationRequestResponse {
    pub allowed: bool,
    pub remaining_attempts: u32,
    pub reset_in_seconds: u64,
}
