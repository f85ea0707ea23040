//! Postgres-backed attempt store.
//!
//! Flow Overview:
//! 1) Records live in the `login_attempts` table (see `sql/schema.sql`).
//! 2) `upsert` takes a transaction-scoped advisory lock keyed on the identity,
//!    reads the row, applies the mutation and writes it back before commit.
//! 3) Rows are converted through `AttemptRow` and validated before use.
//!
//! Scaling: the advisory lock serializes concurrent failures for one account
//! across every service instance sharing the database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{Instrument, error, info_span};

use super::{AttemptStore, Mutation};
use crate::security::{Identity, LoginAttemptRecord, SecurityError};

pub const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const SELECT_COLUMNS: &str =
    "identity, failed_attempts, lockout_until, last_attempt_at, ip_address, user_agent";

#[derive(Clone, Debug)]
pub struct PgAttemptStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct AttemptRow {
    identity: String,
    failed_attempts: i32,
    lockout_until: Option<DateTime<Utc>>,
    last_attempt_at: DateTime<Utc>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl TryFrom<AttemptRow> for LoginAttemptRecord {
    type Error = SecurityError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let failed_attempts = u32::try_from(row.failed_attempts).map_err(|_| {
            SecurityError::storage(format!(
                "negative failed_attempts for {}: {}",
                row.identity, row.failed_attempts
            ))
        })?;

        let record = Self {
            identity: row.identity,
            failed_attempts,
            lockout_until: row.lockout_until,
            last_attempt_at: row.last_attempt_at,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
        };
        record.validate()?;
        Ok(record)
    }
}

fn db_error(operation: &'static str, err: &sqlx::Error) -> SecurityError {
    error!(operation, "login_attempts query failed: {err}");
    SecurityError::storage(err)
}

fn db_span(operation: &'static str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.table = "login_attempts"
    )
}

impl PgAttemptStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `login_attempts` table and its index if missing.
    ///
    /// # Errors
    /// Returns `SecurityError::StorageUnavailable` if the DDL fails.
    pub async fn migrate(&self) -> Result<(), SecurityError> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(db_span("CREATE"))
            .await
            .map_err(|err| db_error("migrate", &err))?;
        Ok(())
    }
}

#[async_trait]
impl AttemptStore for PgAttemptStore {
    async fn get(&self, identity: &Identity) -> Result<Option<LoginAttemptRecord>, SecurityError> {
        let query = format!("SELECT {SELECT_COLUMNS} FROM login_attempts WHERE identity = $1");
        let row: Option<AttemptRow> = sqlx::query_as(&query)
            .bind(identity.as_str())
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT"))
            .await
            .map_err(|err| db_error("get", &err))?;

        row.map(LoginAttemptRecord::try_from).transpose()
    }

    async fn upsert(
        &self,
        identity: &Identity,
        mutation: &Mutation<'_>,
    ) -> Result<LoginAttemptRecord, SecurityError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| db_error("begin", &err))?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(identity.as_str())
            .execute(&mut *tx)
            .instrument(db_span("LOCK"))
            .await
            .map_err(|err| db_error("lock", &err))?;

        let query =
            format!("SELECT {SELECT_COLUMNS} FROM login_attempts WHERE identity = $1 FOR UPDATE");
        let current: Option<AttemptRow> = sqlx::query_as(&query)
            .bind(identity.as_str())
            .fetch_optional(&mut *tx)
            .instrument(db_span("SELECT"))
            .await
            .map_err(|err| db_error("upsert_select", &err))?;
        let current = current.map(LoginAttemptRecord::try_from).transpose()?;

        let next = mutation(current.as_ref());
        next.validate()?;
        let failed_attempts = i32::try_from(next.failed_attempts)
            .map_err(|_| SecurityError::storage("failed_attempts out of range"))?;

        let query = r"
            INSERT INTO login_attempts
                (identity, failed_attempts, lockout_until, last_attempt_at, ip_address, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (identity) DO UPDATE SET
                failed_attempts = EXCLUDED.failed_attempts,
                lockout_until = EXCLUDED.lockout_until,
                last_attempt_at = EXCLUDED.last_attempt_at,
                ip_address = EXCLUDED.ip_address,
                user_agent = EXCLUDED.user_agent,
                updated_at = NOW()
        ";
        sqlx::query(query)
            .bind(identity.as_str())
            .bind(failed_attempts)
            .bind(next.lockout_until)
            .bind(next.last_attempt_at)
            .bind(next.ip_address.as_deref())
            .bind(next.user_agent.as_deref())
            .execute(&mut *tx)
            .instrument(db_span("INSERT"))
            .await
            .map_err(|err| db_error("upsert_write", &err))?;

        tx.commit()
            .await
            .map_err(|err| db_error("commit", &err))?;

        Ok(next)
    }

    async fn delete(&self, identity: &Identity) -> Result<(), SecurityError> {
        sqlx::query("DELETE FROM login_attempts WHERE identity = $1")
            .bind(identity.as_str())
            .execute(&self.pool)
            .instrument(db_span("DELETE"))
            .await
            .map_err(|err| db_error("delete", &err))?;
        Ok(())
    }

    async fn delete_expired(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<bool, SecurityError> {
        let result =
            sqlx::query("DELETE FROM login_attempts WHERE identity = $1 AND lockout_until <= $2")
                .bind(identity.as_str())
                .bind(now)
                .execute(&self.pool)
                .instrument(db_span("DELETE"))
                .await
                .map_err(|err| db_error("delete_expired", &err))?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, SecurityError> {
        let result = sqlx::query("DELETE FROM login_attempts WHERE lockout_until <= $1")
            .bind(now)
            .execute(&self.pool)
            .instrument(db_span("DELETE"))
            .await
            .map_err(|err| db_error("purge_expired", &err))?;
        Ok(result.rows_affected())
    }

    async fn locked(&self, now: DateTime<Utc>) -> Result<Vec<LoginAttemptRecord>, SecurityError> {
        let query = format!(
            "SELECT {SELECT_COLUMNS} FROM login_attempts \
             WHERE lockout_until > $1 ORDER BY lockout_until"
        );
        let rows: Vec<AttemptRow> = sqlx::query_as(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT"))
            .await
            .map_err(|err| db_error("locked", &err))?;

        rows.into_iter().map(LoginAttemptRecord::try_from).collect()
    }

    async fn ping(&self) -> Result<(), SecurityError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .instrument(db_span("PING"))
            .await
            .map_err(|err| db_error("ping", &err))?;
        Ok(())
    }
}
