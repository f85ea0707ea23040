use clap::{Arg, Command, builder::ValueParser};

pub const ARG_MAX_ATTEMPTS: &str = "max-attempts";
pub const ARG_LOCKOUT_DURATION_MS: &str = "lockout-duration-ms";
pub const ARG_RATE_LIMIT_WINDOW_MS: &str = "rate-limit-window-ms";
pub const ARG_RATE_LIMIT_MAX_ATTEMPTS: &str = "rate-limit-max-attempts";
pub const ARG_SWEEP_INTERVAL_SECONDS: &str = "sweep-interval-seconds";

/// Accept strictly positive integers; zero would disable the guard it configures.
#[must_use]
pub fn validator_positive_u64() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<u64, String> {
        match value.trim().parse::<u64>() {
            Ok(0) => Err("value must be greater than zero".to_string()),
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(format!("invalid number: {value}")),
        }
    })
}

#[must_use]
pub fn validator_positive_u32() -> ValueParser {
    ValueParser::from(move |value: &str| -> std::result::Result<u32, String> {
        match value.trim().parse::<u32>() {
            Ok(0) => Err("value must be greater than zero".to_string()),
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(format!("invalid number: {value}")),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_lockout_args(command);
    with_rate_limit_args(command)
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_ATTEMPTS)
                .long(ARG_MAX_ATTEMPTS)
                .help("Failed logins allowed before an account is locked")
                .env("LOGINGUARD_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(validator_positive_u32()),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_DURATION_MS)
                .long(ARG_LOCKOUT_DURATION_MS)
                .help("Lockout duration in milliseconds, counted from the locking failure")
                .env("LOGINGUARD_LOCKOUT_DURATION_MS")
                .default_value("900000")
                .value_parser(validator_positive_u64()),
        )
}

fn with_rate_limit_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_WINDOW_MS)
                .long(ARG_RATE_LIMIT_WINDOW_MS)
                .help("Fixed rate limit window in milliseconds")
                .env("LOGINGUARD_RATE_LIMIT_WINDOW_MS")
                .default_value("3600000")
                .value_parser(validator_positive_u64()),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_MAX_ATTEMPTS)
                .long(ARG_RATE_LIMIT_MAX_ATTEMPTS)
                .help("Attempts allowed per key in each rate limit window")
                .env("LOGINGUARD_RATE_LIMIT_MAX_ATTEMPTS")
                .default_value("3")
                .value_parser(validator_positive_u32()),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL_SECONDS)
                .long(ARG_SWEEP_INTERVAL_SECONDS)
                .help("Seconds between sweeps of expired lockouts and rate limit windows")
                .env("LOGINGUARD_SWEEP_INTERVAL_SECONDS")
                .default_value("60")
                .value_parser(validator_positive_u64()),
        )
}
