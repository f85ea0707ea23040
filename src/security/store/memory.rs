use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{AttemptStore, Mutation};
use crate::security::{Identity, LoginAttemptRecord, SecurityError};

/// Process-local store. Used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    records: Mutex<HashMap<String, LoginAttemptRecord>>,
}

impl MemoryAttemptStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl AttemptStore for MemoryAttemptStore {
    async fn get(&self, identity: &Identity) -> Result<Option<LoginAttemptRecord>, SecurityError> {
        Ok(self.records.lock().await.get(identity.as_str()).cloned())
    }

    async fn upsert(
        &self,
        identity: &Identity,
        mutation: &Mutation<'_>,
    ) -> Result<LoginAttemptRecord, SecurityError> {
        let mut records = self.records.lock().await;
        let record = mutation(records.get(identity.as_str()));
        record.validate()?;
        records.insert(identity.as_str().to_string(), record.clone());
        Ok(record)
    }

    async fn delete(&self, identity: &Identity) -> Result<(), SecurityError> {
        self.records.lock().await.remove(identity.as_str());
        Ok(())
    }

    async fn delete_expired(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<bool, SecurityError> {
        let mut records = self.records.lock().await;
        let expired = records
            .get(identity.as_str())
            .and_then(|record| record.lockout_until)
            .is_some_and(|until| until <= now);
        if expired {
            records.remove(identity.as_str());
        }
        Ok(expired)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, SecurityError> {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| record.lockout_until.is_none_or(|until| until > now));
        Ok(u64::try_from(before - records.len()).unwrap_or(u64::MAX))
    }

    async fn locked(&self, now: DateTime<Utc>) -> Result<Vec<LoginAttemptRecord>, SecurityError> {
        let records = self.records.lock().await;
        let mut locked: Vec<LoginAttemptRecord> = records
            .values()
            .filter(|record| record.is_locked_at(now))
            .cloned()
            .collect();
        locked.sort_by_key(|record| record.lockout_until);
        Ok(locked)
    }
}
