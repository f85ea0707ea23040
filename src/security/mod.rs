//! Login security: per-account lockout tracking and generic rate limiting.
//!
//! ## Lockout
//!
//! Failed logins are counted per normalized email. Reaching `max_attempts`
//! (default 5) locks the account for `lockout_duration` (default 15 minutes),
//! measured from the failure that crossed the threshold. A successful login
//! or an admin clear deletes the record; an expired lockout is cleared the
//! next time the account is checked or by the sweeper.
//!
//! State per account: `Unlocked -> (failures) -> Locked(until) -> (time) -> Unlocked`,
//! with success and admin clears forcing `Unlocked` from any state.
//!
//! ## Fail closed
//!
//! Storage errors surface as `SecurityError::StorageUnavailable`. Callers must
//! deny the login when they see one; they are never read as "not locked".
//!
//! ## Rate limiting
//!
//! `RateLimiter` is an in-memory fixed-window counter keyed by arbitrary
//! strings (default 3 attempts per hour), independent of the lockout store.

mod clock;
mod error;
mod identity;
mod policy;
mod rate_limit;
mod record;
mod service;
pub mod store;
mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SecurityError;
pub use identity::Identity;
pub use policy::{DEFAULT_LOCKOUT_DURATION, DEFAULT_MAX_ATTEMPTS, LockoutDecision, LockoutPolicy};
pub use rate_limit::{
    DEFAULT_RATE_LIMIT_MAX_ATTEMPTS, DEFAULT_RATE_LIMIT_WINDOW, RateLimitDecision, RateLimiter,
};
pub use record::{LoginAttemptRecord, RateLimitEntry};
pub use service::{AttemptDetails, LockoutInfo, LockoutStatus, SecurityService};
pub use store::{AttemptStore, MemoryAttemptStore, PgAttemptStore};
pub use sweeper::Sweeper;
