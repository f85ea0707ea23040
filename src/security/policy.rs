//! Pure lockout decisions. No I/O happens here.
//!
//! Flow Overview:
//! 1) `evaluate` maps the stored record (if any) to a decision.
//! 2) `record_failure` produces the next record after a bad password.
//! 3) Lockouts start at the failure that reaches `max_attempts` and are never
//!    extended by status checks or by further failures while active.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

use super::record::LoginAttemptRecord;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_millis(900_000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockoutDecision {
    Allowed { remaining_attempts: u32 },
    /// Active lockout; `until` is the stored value.
    Locked { until: DateTime<Utc> },
    /// The stored lockout has run out. Allowed; the caller clears the record.
    Expired,
    /// Count is at the cap but no lockout was stored. Denied; the caller
    /// persists `until`.
    ThresholdReached { until: DateTime<Utc> },
}

impl LockoutDecision {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. } | Self::Expired)
    }

    #[must_use]
    pub fn lockout_until(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Locked { until } | Self::ThresholdReached { until } => Some(*until),
            Self::Allowed { .. } | Self::Expired => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct LockoutPolicy {
    max_attempts: u32,
    lockout_duration: Duration,
}

impl LockoutPolicy {
    /// `max_attempts` below 1 is raised to 1.
    #[must_use]
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            lockout_duration,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn lockout_duration(&self) -> Duration {
        self.lockout_duration
    }

    fn lockout_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.lockout_duration).unwrap_or(TimeDelta::MAX)
    }

    fn lockout_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.lockout_delta())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    #[must_use]
    pub fn evaluate(
        &self,
        record: Option<&LoginAttemptRecord>,
        now: DateTime<Utc>,
    ) -> LockoutDecision {
        let Some(record) = record else {
            return LockoutDecision::Allowed {
                remaining_attempts: self.max_attempts,
            };
        };

        match record.lockout_until {
            Some(until) if now < until => LockoutDecision::Locked { until },
            Some(_) => LockoutDecision::Expired,
            None if record.failed_attempts >= self.max_attempts => {
                LockoutDecision::ThresholdReached {
                    until: self.lockout_from(now),
                }
            }
            None => LockoutDecision::Allowed {
                remaining_attempts: self.remaining_attempts(Some(record)),
            },
        }
    }

    /// Next record after a failed login.
    ///
    /// The count stays within `[1, max_attempts]`. A failure after an expired
    /// lockout starts a new count.
    #[must_use]
    pub fn record_failure(
        &self,
        record: Option<&LoginAttemptRecord>,
        identity: &str,
        now: DateTime<Utc>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> LoginAttemptRecord {
        let (failed_attempts, lockout_until) = match record {
            Some(current) if current.is_locked_at(now) => {
                (current.failed_attempts, current.lockout_until)
            }
            Some(current) if current.lockout_until.is_none() => {
                let next = current
                    .failed_attempts
                    .saturating_add(1)
                    .min(self.max_attempts);
                (next, None)
            }
            // Absent, or the previous lockout already ran out.
            _ => (1, None),
        };

        let lockout_until = match lockout_until {
            Some(until) => Some(until),
            None if failed_attempts >= self.max_attempts => Some(self.lockout_from(now)),
            None => None,
        };

        LoginAttemptRecord {
            identity: identity.to_string(),
            failed_attempts,
            lockout_until,
            last_attempt_at: now,
            ip_address: ip_address.map(str::to_string),
            user_agent: user_agent.map(str::to_string),
        }
    }

    #[must_use]
    pub fn remaining_attempts(&self, record: Option<&LoginAttemptRecord>) -> u32 {
        record.map_or(self.max_attempts, |record| {
            self.max_attempts.saturating_sub(record.failed_attempts)
        })
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_LOCKOUT_DURATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMAIL: &str = "user@example.com";

    fn fail_times(policy: &LockoutPolicy, times: u32, now: DateTime<Utc>) -> LoginAttemptRecord {
        let mut record = None;
        for _ in 0..times {
            record = Some(policy.record_failure(
                record.as_ref(),
                EMAIL,
                now,
                Some("1.2.3.4"),
                None,
            ));
        }
        record.unwrap_or_else(|| panic!("times must be positive"))
    }

    #[test]
    fn absent_record_is_allowed_with_full_budget() {
        let policy = LockoutPolicy::default();
        assert_eq!(
            policy.evaluate(None, Utc::now()),
            LockoutDecision::Allowed {
                remaining_attempts: 5
            }
        );
    }

    #[test]
    fn below_threshold_is_allowed() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        for failures in 1..5 {
            let record = fail_times(&policy, failures, now);
            let decision = policy.evaluate(Some(&record), now);
            assert!(decision.is_allowed());
            assert_eq!(
                decision,
                LockoutDecision::Allowed {
                    remaining_attempts: 5 - failures
                }
            );
        }
    }

    #[test]
    fn reaching_threshold_sets_lockout() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let record = fail_times(&policy, 5, now);

        assert_eq!(record.failed_attempts, 5);
        assert_eq!(
            record.lockout_until,
            Some(now + TimeDelta::milliseconds(900_000))
        );
        assert_eq!(
            policy.evaluate(Some(&record), now + TimeDelta::seconds(1)),
            LockoutDecision::Locked {
                until: now + TimeDelta::milliseconds(900_000)
            }
        );
    }

    #[test]
    fn checking_does_not_extend_lockout() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let record = fail_times(&policy, 5, now);

        let later = now + TimeDelta::minutes(10);
        assert_eq!(
            policy.evaluate(Some(&record), later).lockout_until(),
            record.lockout_until
        );
    }

    #[test]
    fn failures_while_locked_keep_original_window() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let locked = fail_times(&policy, 5, now);

        let later = now + TimeDelta::minutes(5);
        let next =
            policy.record_failure(Some(&locked), EMAIL, later, Some("5.6.7.8"), Some("curl"));
        assert_eq!(next.failed_attempts, 5);
        assert_eq!(next.lockout_until, locked.lockout_until);
        assert_eq!(next.last_attempt_at, later);
        assert_eq!(next.ip_address.as_deref(), Some("5.6.7.8"));
        assert_eq!(next.user_agent.as_deref(), Some("curl"));
    }

    #[test]
    fn expired_lockout_is_allowed() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let record = fail_times(&policy, 5, now);

        let after = now + TimeDelta::milliseconds(900_000);
        let decision = policy.evaluate(Some(&record), after);
        assert_eq!(decision, LockoutDecision::Expired);
        assert!(decision.is_allowed());
    }

    #[test]
    fn failure_after_expiry_restarts_count() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let record = fail_times(&policy, 5, now);

        let after = now + TimeDelta::minutes(20);
        let next = policy.record_failure(Some(&record), EMAIL, after, None, None);
        assert_eq!(next.failed_attempts, 1);
        assert_eq!(next.lockout_until, None);
    }

    #[test]
    fn threshold_without_lockout_is_denied() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let record = LoginAttemptRecord {
            identity: EMAIL.to_string(),
            failed_attempts: 5,
            lockout_until: None,
            last_attempt_at: now,
            ip_address: None,
            user_agent: None,
        };

        let decision = policy.evaluate(Some(&record), now);
        assert_eq!(
            decision,
            LockoutDecision::ThresholdReached {
                until: now + TimeDelta::milliseconds(900_000)
            }
        );
        assert!(!decision.is_allowed());
    }

    #[test]
    fn zero_max_attempts_is_clamped() {
        let policy = LockoutPolicy::new(0, Duration::from_secs(60));
        assert_eq!(policy.max_attempts(), 1);
        let record = policy.record_failure(None, EMAIL, Utc::now(), None, None);
        assert!(record.lockout_until.is_some());
    }
}
