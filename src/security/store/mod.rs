//! Durable storage for `LoginAttemptRecord`s, one per identity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Identity, LoginAttemptRecord, SecurityError};

mod memory;
mod postgres;

pub use memory::MemoryAttemptStore;
pub use postgres::PgAttemptStore;

/// Read-modify-write step applied by [`AttemptStore::upsert`].
///
/// Receives the stored record (or `None`) and returns the record to persist.
pub type Mutation<'a> =
    dyn Fn(Option<&LoginAttemptRecord>) -> LoginAttemptRecord + Send + Sync + 'a;

#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn get(&self, identity: &Identity) -> Result<Option<LoginAttemptRecord>, SecurityError>;

    /// Create or update the record for `identity`.
    ///
    /// Implementations hold the identity exclusively while `mutation` runs so
    /// concurrent failures for the same account are all counted.
    async fn upsert(
        &self,
        identity: &Identity,
        mutation: &Mutation<'_>,
    ) -> Result<LoginAttemptRecord, SecurityError>;

    /// Idempotent; deleting a missing record is not an error.
    async fn delete(&self, identity: &Identity) -> Result<(), SecurityError>;

    /// Delete the record for `identity` only if its lockout ended at or
    /// before `now`. Returns `false` when the stored record no longer
    /// matches, e.g. a failure rewrote it after the caller's read.
    async fn delete_expired(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<bool, SecurityError>;

    /// Delete records whose lockout ended at or before `now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, SecurityError>;

    /// Records with a lockout still running at `now`, soonest expiry first.
    async fn locked(&self, now: DateTime<Utc>) -> Result<Vec<LoginAttemptRecord>, SecurityError>;

    async fn ping(&self) -> Result<(), SecurityError> {
        Ok(())
    }
}
