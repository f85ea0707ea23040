//! Fixed-schema records persisted by the attempt store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SecurityError;

/// Failed-login bookkeeping for one identity.
///
/// A record only exists while `failed_attempts >= 1`; success and admin
/// clears delete it instead of zeroing it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttemptRecord {
    pub identity: String,
    pub failed_attempts: u32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub last_attempt_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl LoginAttemptRecord {
    /// Reject records that violate the storage schema.
    ///
    /// # Errors
    /// Returns `SecurityError::StorageUnavailable` for an empty identity or a
    /// zero attempt count.
    pub fn validate(&self) -> Result<(), SecurityError> {
        if self.identity.is_empty() {
            return Err(SecurityError::storage("record without identity"));
        }
        if self.failed_attempts == 0 {
            return Err(SecurityError::storage(format!(
                "record for {} has zero failed attempts",
                self.identity
            )));
        }
        Ok(())
    }

    /// Whether the lockout, if any, is still running at `now`.
    #[must_use]
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.lockout_until.is_some_and(|until| now < until)
    }
}

/// Fixed-window counter for one rate limit key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub attempts: u32,
    pub window_start: DateTime<Utc>,
    pub last_attempt: DateTime<Utc>,
}

impl RateLimitEntry {
    #[must_use]
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            attempts: 1,
            window_start: now,
            last_attempt: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn record(failed_attempts: u32) -> LoginAttemptRecord {
        LoginAttemptRecord {
            identity: "user@example.com".to_string(),
            failed_attempts,
            lockout_until: None,
            last_attempt_at: Utc::now(),
            ip_address: Some("1.2.3.4".to_string()),
            user_agent: None,
        }
    }

    #[test]
    fn validate_accepts_positive_count() {
        assert!(record(1).validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_count_and_empty_identity() {
        assert!(record(0).validate().is_err());

        let mut anonymous = record(2);
        anonymous.identity.clear();
        assert!(anonymous.validate().is_err());
    }

    #[test]
    fn is_locked_at_respects_boundary() {
        let now = Utc::now();
        let mut locked = record(5);
        locked.lockout_until = Some(now + TimeDelta::minutes(15));

        assert!(locked.is_locked_at(now));
        assert!(!locked.is_locked_at(now + TimeDelta::minutes(15)));
        assert!(!record(3).is_locked_at(now));
    }
}
