//! Fixed-window rate limiting for non-auth flows (verification codes, etc.).
//!
//! Each key gets a counter anchored at its first attempt. Once the window has
//! elapsed the counter resets entirely on the next attempt; it never slides.
//! The map is process-local and only shrinks through `cleanup`, which the
//! sweeper runs periodically.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{Clock, RateLimitEntry, SystemClock};

pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_millis(3_600_000);
pub const DEFAULT_RATE_LIMIT_MAX_ATTEMPTS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub struct RateLimiter {
    max_attempts: u32,
    window: TimeDelta,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl RateLimiter {
    /// `max_attempts` below 1 is raised to 1.
    #[must_use]
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self::with_clock(max_attempts, window, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(max_attempts: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, RateLimitEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expired(&self, entry: &RateLimitEntry, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.window_start) >= self.window
    }

    /// Record an attempt for `key` if the window still has room.
    ///
    /// Denied attempts are not counted, so the counter never exceeds the cap.
    pub fn is_allowed(&self, key: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries();

        match entries.get_mut(key) {
            Some(entry) if !self.expired(entry, now) => {
                if entry.attempts >= self.max_attempts {
                    return false;
                }
                entry.attempts += 1;
                entry.last_attempt = now;
                true
            }
            _ => {
                entries.insert(key.to_string(), RateLimitEntry::start(now));
                true
            }
        }
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        if self.is_allowed(key) {
            RateLimitDecision::Allowed
        } else {
            RateLimitDecision::Limited
        }
    }

    #[must_use]
    pub fn remaining_attempts(&self, key: &str) -> u32 {
        let now = self.clock.now();
        self.entries()
            .get(key)
            .filter(|entry| !self.expired(entry, now))
            .map_or(self.max_attempts, |entry| {
                self.max_attempts.saturating_sub(entry.attempts)
            })
    }

    /// Time until `key`'s window resets; zero when it has no live window.
    #[must_use]
    pub fn time_until_reset(&self, key: &str) -> Duration {
        let now = self.clock.now();
        self.entries()
            .get(key)
            .filter(|entry| !self.expired(entry, now))
            .and_then(|entry| entry.window_start.checked_add_signed(self.window))
            .and_then(|reset_at| reset_at.signed_duration_since(now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }

    /// Forget `key`, e.g. once the flow it guarded has completed.
    pub fn reset(&self, key: &str) {
        self.entries().remove(key);
    }

    /// Drop every entry whose window has elapsed. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !self.expired(entry, now));
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_MAX_ATTEMPTS, DEFAULT_RATE_LIMIT_WINDOW)
    }
}
