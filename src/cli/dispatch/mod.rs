//! Map parsed CLI arguments to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_ADMIN_TOKEN, ARG_DB_PASSWORD, ARG_DSN, ARG_PORT, security};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .map(|dsn| dsn.trim().to_string())
        .filter(|dsn| !dsn.is_empty());
    let db_password = matches
        .get_one::<String>(ARG_DB_PASSWORD)
        .cloned()
        .map(SecretString::from);
    let admin_token = matches
        .get_one::<String>(ARG_ADMIN_TOKEN)
        .cloned()
        .map(SecretString::from);

    let max_attempts = matches
        .get_one::<u32>(security::ARG_MAX_ATTEMPTS)
        .copied()
        .context("missing required argument: --max-attempts")?;
    let lockout_duration_ms = matches
        .get_one::<u64>(security::ARG_LOCKOUT_DURATION_MS)
        .copied()
        .context("missing required argument: --lockout-duration-ms")?;
    let rate_limit_window_ms = matches
        .get_one::<u64>(security::ARG_RATE_LIMIT_WINDOW_MS)
        .copied()
        .context("missing required argument: --rate-limit-window-ms")?;
    let rate_limit_max_attempts = matches
        .get_one::<u32>(security::ARG_RATE_LIMIT_MAX_ATTEMPTS)
        .copied()
        .context("missing required argument: --rate-limit-max-attempts")?;
    let sweep_interval_seconds = matches
        .get_one::<u64>(security::ARG_SWEEP_INTERVAL_SECONDS)
        .copied()
        .context("missing required argument: --sweep-interval-seconds")?;

    Ok(Action::Server(Args {
        port,
        dsn,
        db_password,
        admin_token,
        max_attempts,
        lockout_duration: Duration::from_millis(lockout_duration_ms),
        rate_limit_window: Duration::from_millis(rate_limit_window_ms),
        rate_limit_max_attempts,
        sweep_interval: Duration::from_secs(sweep_interval_seconds),
    }))
}
