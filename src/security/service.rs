//! Login-flow orchestration over the attempt store and the lockout policy.
//!
//! Flow Overview:
//! 1) The login route calls `check_lockout_status` before verifying a password.
//! 2) A bad password is reported with `record_failed_attempt`.
//! 3) A good password, or an admin, calls `clear_lockout`.
//!
//! Lockouts are per account: the IP address is recorded for display and logs
//! but is not part of the key. Storage errors are returned to the caller and
//! must be treated as a denial.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};

use super::{
    AttemptStore, Clock, Identity, LockoutDecision, LockoutPolicy, LoginAttemptRecord,
    SecurityError, SystemClock,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LockoutStatus {
    pub locked: bool,
    pub lockout_until: Option<DateTime<Utc>>,
    pub remaining_attempts: u32,
}

impl LockoutStatus {
    fn allowed(remaining_attempts: u32) -> Self {
        Self {
            locked: false,
            lockout_until: None,
            remaining_attempts,
        }
    }

    fn locked(until: DateTime<Utc>) -> Self {
        Self {
            locked: true,
            lockout_until: Some(until),
            remaining_attempts: 0,
        }
    }
}

/// Snapshot of a stored record for administrative display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttemptDetails {
    pub identity: String,
    pub failed_attempts: u32,
    pub remaining_attempts: u32,
    pub locked: bool,
    pub lockout_until: Option<DateTime<Utc>>,
    pub last_attempt_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockoutInfo {
    /// No record is stored for the normalized `identity`.
    NotLocked { identity: String },
    Attempts(AttemptDetails),
}

pub struct SecurityService {
    store: Arc<dyn AttemptStore>,
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
}

impl SecurityService {
    #[must_use]
    pub fn new(store: Arc<dyn AttemptStore>, policy: LockoutPolicy) -> Self {
        Self::with_clock(store, policy, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        store: Arc<dyn AttemptStore>,
        policy: LockoutPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    #[must_use]
    pub fn store(&self) -> &dyn AttemptStore {
        self.store.as_ref()
    }

    /// Current time on the service clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Decide whether a login may proceed for `email`.
    ///
    /// An expired lockout is cleared before returning. A record that reached
    /// the threshold without a stored lockout gets one persisted.
    ///
    /// # Errors
    /// `InvalidIdentity` for a malformed email, `StorageUnavailable` if the
    /// store fails. Neither may be treated as "not locked".
    #[instrument(skip_all, fields(ip = ip.unwrap_or("-")))]
    pub async fn check_lockout_status(
        &self,
        email: &str,
        ip: Option<&str>,
    ) -> Result<LockoutStatus, SecurityError> {
        let identity = Identity::parse(email)?;
        let now = self.clock.now();
        let record = self.store.get(&identity).await?;

        match self.policy.evaluate(record.as_ref(), now) {
            LockoutDecision::Allowed { remaining_attempts } => {
                Ok(LockoutStatus::allowed(remaining_attempts))
            }
            LockoutDecision::Locked { until } => {
                debug!(identity = %identity, %until, "login denied, account locked");
                Ok(LockoutStatus::locked(until))
            }
            LockoutDecision::Expired => {
                if self.store.delete_expired(&identity, now).await? {
                    debug!(identity = %identity, "expired lockout cleared");
                    return Ok(LockoutStatus::allowed(self.policy.max_attempts()));
                }
                // Rewritten since the read, usually by a failure starting a fresh count.
                let current = self.store.get(&identity).await?;
                Ok(current.map_or_else(
                    || LockoutStatus::allowed(self.policy.max_attempts()),
                    |record| self.status_for(&record, now),
                ))
            }
            LockoutDecision::ThresholdReached { until } => {
                let persisted = self
                    .store
                    .upsert(&identity, &|current| match current {
                        Some(current) if current.lockout_until.is_some() => current.clone(),
                        Some(current) => LoginAttemptRecord {
                            lockout_until: Some(until),
                            ..current.clone()
                        },
                        // Cleared between read and write; keep the denial already decided.
                        None => LoginAttemptRecord {
                            identity: identity.as_str().to_string(),
                            failed_attempts: self.policy.max_attempts(),
                            lockout_until: Some(until),
                            last_attempt_at: now,
                            ip_address: ip.map(str::to_string),
                            user_agent: None,
                        },
                    })
                    .await?;
                let until = persisted.lockout_until.unwrap_or(until);
                warn!(identity = %identity, %until, "account locked at attempt threshold");
                Ok(LockoutStatus::locked(until))
            }
        }
    }

    /// Count a failed login and lock the account once the threshold is hit.
    ///
    /// # Errors
    /// `InvalidIdentity` for a malformed email, `StorageUnavailable` if the
    /// store fails.
    #[instrument(skip_all, fields(ip = ip.unwrap_or("-")))]
    pub async fn record_failed_attempt(
        &self,
        email: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<LockoutStatus, SecurityError> {
        let identity = Identity::parse(email)?;
        let now = self.clock.now();
        let crossed = AtomicBool::new(false);

        let record = self
            .store
            .upsert(&identity, &|current| {
                let next =
                    self.policy
                        .record_failure(current, identity.as_str(), now, ip, user_agent);
                let was_locked = current.is_some_and(|current| current.is_locked_at(now));
                if !was_locked && next.is_locked_at(now) {
                    crossed.store(true, Ordering::Relaxed);
                }
                next
            })
            .await?;

        if crossed.load(Ordering::Relaxed) {
            warn!(
                identity = %identity,
                failed_attempts = record.failed_attempts,
                lockout_until = ?record.lockout_until,
                "account locked after repeated failed logins"
            );
        } else {
            debug!(
                identity = %identity,
                failed_attempts = record.failed_attempts,
                "failed login recorded"
            );
        }

        Ok(self.status_for(&record, now))
    }

    /// Remove any attempt record for `email`. Idempotent.
    ///
    /// # Errors
    /// `InvalidIdentity` for a malformed email, `StorageUnavailable` if the
    /// delete fails; a failed clear is never reported as success.
    #[instrument(skip_all, fields(ip = ip.unwrap_or("-")))]
    pub async fn clear_lockout(&self, email: &str, ip: Option<&str>) -> Result<(), SecurityError> {
        let identity = Identity::parse(email)?;
        self.store.delete(&identity).await?;
        info!(identity = %identity, "login attempts cleared");
        Ok(())
    }

    /// Read-only view of the stored record. Expired lockouts are reported as
    /// unlocked but left in place.
    ///
    /// # Errors
    /// `InvalidIdentity` for a malformed email, `StorageUnavailable` if the
    /// store fails.
    #[instrument(skip_all, fields(ip = ip.unwrap_or("-")))]
    pub async fn get_lockout_info(
        &self,
        email: &str,
        ip: Option<&str>,
    ) -> Result<LockoutInfo, SecurityError> {
        let identity = Identity::parse(email)?;
        let now = self.clock.now();
        let info = self
            .store
            .get(&identity)
            .await?
            .map_or_else(
                || LockoutInfo::NotLocked {
                    identity: identity.as_str().to_string(),
                },
                |record| LockoutInfo::Attempts(self.details(record, now)),
            );
        Ok(info)
    }

    /// Accounts with a running lockout, soonest expiry first.
    ///
    /// # Errors
    /// `StorageUnavailable` if the store fails.
    pub async fn locked_accounts(&self) -> Result<Vec<AttemptDetails>, SecurityError> {
        let now = self.clock.now();
        let records = self.store.locked(now).await?;
        Ok(records
            .into_iter()
            .map(|record| self.details(record, now))
            .collect())
    }

    /// Delete records whose lockout has run out.
    ///
    /// # Errors
    /// `StorageUnavailable` if the store fails.
    pub async fn purge_expired(&self) -> Result<u64, SecurityError> {
        let purged = self.store.purge_expired(self.clock.now()).await?;
        if purged > 0 {
            debug!(purged, "expired lockouts purged");
        }
        Ok(purged)
    }

    fn status_for(&self, record: &LoginAttemptRecord, now: DateTime<Utc>) -> LockoutStatus {
        match record.lockout_until {
            Some(until) if now < until => LockoutStatus::locked(until),
            _ => LockoutStatus::allowed(self.policy.remaining_attempts(Some(record))),
        }
    }

    fn details(&self, record: LoginAttemptRecord, now: DateTime<Utc>) -> AttemptDetails {
        let locked = record.is_locked_at(now);
        AttemptDetails {
            remaining_attempts: if locked {
                0
            } else {
                self.policy.remaining_attempts(Some(&record))
            },
            locked,
            identity: record.identity,
            failed_attempts: record.failed_attempts,
            lockout_until: record.lockout_until,
            last_attempt_at: record.last_attempt_at,
            ip_address: record.ip_address,
            user_agent: record.user_agent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::store::Mutation;
    use crate::security::{ManualClock, MemoryAttemptStore};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use std::time::Duration;

    const EMAIL: &str = "user@example.com";
    const IP: Option<&str> = Some("1.2.3.4");

    struct Fixture {
        store: Arc<MemoryAttemptStore>,
        clock: Arc<ManualClock>,
        service: SecurityService,
    }

    fn fixture(max_attempts: u32) -> Fixture {
        let store = Arc::new(MemoryAttemptStore::new());
        let clock = Arc::new(ManualClock::default());
        let service = SecurityService::with_clock(
            store.clone(),
            LockoutPolicy::new(max_attempts, Duration::from_millis(900_000)),
            clock.clone(),
        );
        Fixture {
            store,
            clock,
            service,
        }
    }

    struct UnavailableStore;

    #[async_trait]
    impl AttemptStore for UnavailableStore {
        async fn get(&self, _: &Identity) -> Result<Option<LoginAttemptRecord>, SecurityError> {
            Err(SecurityError::storage("connection refused"))
        }

        async fn upsert(
            &self,
            _: &Identity,
            _: &Mutation<'_>,
        ) -> Result<LoginAttemptRecord, SecurityError> {
            Err(SecurityError::storage("connection refused"))
        }

        async fn delete(&self, _: &Identity) -> Result<(), SecurityError> {
            Err(SecurityError::storage("connection refused"))
        }

        async fn delete_expired(
            &self,
            _: &Identity,
            _: DateTime<Utc>,
        ) -> Result<bool, SecurityError> {
            Err(SecurityError::storage("connection refused"))
        }

        async fn purge_expired(&self, _: DateTime<Utc>) -> Result<u64, SecurityError> {
            Err(SecurityError::storage("connection refused"))
        }

        async fn locked(&self, _: DateTime<Utc>) -> Result<Vec<LoginAttemptRecord>, SecurityError> {
            Err(SecurityError::storage("connection refused"))
        }
    }

    /// Returns the record captured by `stale` from `get`, as if the read
    /// happened before a concurrent write.
    struct StaleReadStore {
        inner: MemoryAttemptStore,
        stale: std::sync::Mutex<Option<LoginAttemptRecord>>,
    }

    #[async_trait]
    impl AttemptStore for StaleReadStore {
        async fn get(
            &self,
            identity: &Identity,
        ) -> Result<Option<LoginAttemptRecord>, SecurityError> {
            let stale = self
                .stale
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take();
            match stale {
                Some(record) => Ok(Some(record)),
                None => self.inner.get(identity).await,
            }
        }

        async fn upsert(
            &self,
            identity: &Identity,
            mutation: &Mutation<'_>,
        ) -> Result<LoginAttemptRecord, SecurityError> {
            self.inner.upsert(identity, mutation).await
        }

        async fn delete(&self, identity: &Identity) -> Result<(), SecurityError> {
            self.inner.delete(identity).await
        }

        async fn delete_expired(
            &self,
            identity: &Identity,
            now: DateTime<Utc>,
        ) -> Result<bool, SecurityError> {
            self.inner.delete_expired(identity, now).await
        }

        async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, SecurityError> {
            self.inner.purge_expired(now).await
        }

        async fn locked(
            &self,
            now: DateTime<Utc>,
        ) -> Result<Vec<LoginAttemptRecord>, SecurityError> {
            self.inner.locked(now).await
        }
    }

    #[tokio::test]
    async fn below_threshold_is_allowed() -> Result<()> {
        let fx = fixture(5);
        for failures in 1..5 {
            fx.service.record_failed_attempt(EMAIL, IP, None).await?;
            let status = fx.service.check_lockout_status(EMAIL, IP).await?;
            assert!(!status.locked);
            assert_eq!(status.remaining_attempts, 5 - failures);
        }
        Ok(())
    }

    #[tokio::test]
    async fn max_attempts_failures_lock_the_account() -> Result<()> {
        let fx = fixture(5);
        let now = fx.clock.now();
        let mut last = None;
        for _ in 0..5 {
            last = Some(fx.service.record_failed_attempt(EMAIL, IP, Some("Mozilla/5.0")).await?);
        }
        assert_eq!(last.map(|status| status.locked), Some(true));

        let status = fx.service.check_lockout_status(EMAIL, IP).await?;
        assert!(status.locked);
        assert_eq!(status.remaining_attempts, 0);
        assert_eq!(
            status.lockout_until,
            Some(now + TimeDelta::milliseconds(900_000))
        );
        Ok(())
    }

    #[tokio::test]
    async fn admin_clear_restores_full_budget() -> Result<()> {
        let fx = fixture(5);
        for _ in 0..5 {
            fx.service.record_failed_attempt(EMAIL, IP, None).await?;
        }
        assert!(fx.service.check_lockout_status(EMAIL, IP).await?.locked);

        fx.service.clear_lockout(EMAIL, Some("1.2.3.4")).await?;
        let status = fx.service.check_lockout_status(EMAIL, IP).await?;
        assert_eq!(
            status,
            LockoutStatus {
                locked: false,
                lockout_until: None,
                remaining_attempts: 5
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn expired_lockout_is_cleared_on_check() -> Result<()> {
        let fx = fixture(5);
        for _ in 0..5 {
            fx.service.record_failed_attempt(EMAIL, IP, None).await?;
        }

        fx.clock.advance(TimeDelta::milliseconds(900_000));
        let status = fx.service.check_lockout_status(EMAIL, IP).await?;
        assert!(!status.locked);
        assert_eq!(status.remaining_attempts, 5);
        assert!(fx.store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn failure_after_expiry_survives_a_stale_expiry_clear() -> Result<()> {
        let store = Arc::new(StaleReadStore {
            inner: MemoryAttemptStore::new(),
            stale: std::sync::Mutex::new(None),
        });
        let clock = Arc::new(ManualClock::default());
        let service = SecurityService::with_clock(
            store.clone(),
            LockoutPolicy::new(5, Duration::from_millis(900_000)),
            clock.clone(),
        );
        for _ in 0..5 {
            service.record_failed_attempt(EMAIL, IP, None).await?;
        }
        let identity = Identity::parse(EMAIL)?;
        let expired = store.inner.get(&identity).await?;

        clock.advance(TimeDelta::milliseconds(900_000));
        // The failure lands after the check read the expired record.
        service.record_failed_attempt(EMAIL, IP, None).await?;
        *store
            .stale
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = expired;

        let status = service.check_lockout_status(EMAIL, IP).await?;
        assert_eq!(status, LockoutStatus::allowed(4));
        let stored = store.inner.get(&identity).await?;
        assert_eq!(stored.map(|record| record.failed_attempts), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn lockout_is_not_extended_by_checks_or_failures() -> Result<()> {
        let fx = fixture(3);
        for _ in 0..3 {
            fx.service.record_failed_attempt(EMAIL, IP, None).await?;
        }
        let first = fx.service.check_lockout_status(EMAIL, IP).await?;

        fx.clock.advance(TimeDelta::minutes(5));
        fx.service.record_failed_attempt(EMAIL, IP, None).await?;
        let second = fx.service.check_lockout_status(EMAIL, IP).await?;
        assert_eq!(first.lockout_until, second.lockout_until);
        Ok(())
    }

    #[tokio::test]
    async fn clear_is_idempotent_without_record() -> Result<()> {
        let fx = fixture(5);
        fx.service.clear_lockout(EMAIL, IP).await?;
        fx.service.clear_lockout(EMAIL, IP).await?;
        Ok(())
    }

    #[tokio::test]
    async fn threshold_without_stored_lockout_gets_persisted() -> Result<()> {
        let fx = fixture(3);
        let identity = Identity::parse(EMAIL)?;
        let now = fx.clock.now();
        fx.store
            .upsert(&identity, &|_| LoginAttemptRecord {
                identity: EMAIL.to_string(),
                failed_attempts: 3,
                lockout_until: None,
                last_attempt_at: now,
                ip_address: None,
                user_agent: None,
            })
            .await?;

        let status = fx.service.check_lockout_status(EMAIL, IP).await?;
        assert!(status.locked);
        let stored = fx.store.get(&identity).await?;
        assert_eq!(
            stored.and_then(|record| record.lockout_until),
            status.lockout_until
        );
        Ok(())
    }

    #[tokio::test]
    async fn lockout_info_projects_record() -> Result<()> {
        let fx = fixture(5);
        assert_eq!(
            fx.service.get_lockout_info(" User@Example.com", IP).await?,
            LockoutInfo::NotLocked {
                identity: EMAIL.to_string()
            }
        );

        fx.service
            .record_failed_attempt("User@Example.com", IP, Some("curl/8"))
            .await?;
        let LockoutInfo::Attempts(details) = fx.service.get_lockout_info(EMAIL, IP).await? else {
            anyhow::bail!("expected attempt details");
        };
        assert_eq!(details.identity, EMAIL);
        assert_eq!(details.failed_attempts, 1);
        assert_eq!(details.remaining_attempts, 4);
        assert!(!details.locked);
        assert_eq!(details.ip_address.as_deref(), Some("1.2.3.4"));
        assert_eq!(details.user_agent.as_deref(), Some("curl/8"));
        Ok(())
    }

    #[tokio::test]
    async fn locked_accounts_and_purge() -> Result<()> {
        let fx = fixture(2);
        for _ in 0..2 {
            fx.service.record_failed_attempt("a@example.com", IP, None).await?;
        }
        fx.service.record_failed_attempt("b@example.com", IP, None).await?;

        let locked = fx.service.locked_accounts().await?;
        assert_eq!(locked.len(), 1);
        assert_eq!(locked[0].identity, "a@example.com");

        fx.clock.advance(TimeDelta::minutes(16));
        assert_eq!(fx.service.purge_expired().await?, 1);
        assert!(fx.service.locked_accounts().await?.is_empty());
        assert_eq!(fx.store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_email_is_rejected_before_storage() {
        let service = SecurityService::new(Arc::new(UnavailableStore), LockoutPolicy::default());
        let result = service.check_lockout_status("nope", IP).await;
        assert!(matches!(result, Err(SecurityError::InvalidIdentity(_))));
    }

    #[tokio::test]
    async fn storage_failure_is_never_reported_as_unlocked() {
        let service = SecurityService::new(Arc::new(UnavailableStore), LockoutPolicy::default());
        assert!(matches!(
            service.check_lockout_status(EMAIL, IP).await,
            Err(SecurityError::StorageUnavailable(_))
        ));
        assert!(matches!(
            service.record_failed_attempt(EMAIL, IP, None).await,
            Err(SecurityError::StorageUnavailable(_))
        ));
        assert!(matches!(
            service.clear_lockout(EMAIL, IP).await,
            Err(SecurityError::StorageUnavailable(_))
        ));
        assert!(matches!(
            service.get_lockout_info(EMAIL, IP).await,
            Err(SecurityError::StorageUnavailable(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_are_all_counted() -> Result<()> {
        let fx = fixture(100);
        let service = Arc::new(fx.service);

        let mut handles = Vec::new();
        for _ in 0..20 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.record_failed_attempt(EMAIL, IP, None).await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        let status = service.check_lockout_status(EMAIL, IP).await?;
        assert_eq!(status.remaining_attempts, 80);
        Ok(())
    }
}
