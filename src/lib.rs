//! # Loginguard (login lockout and rate limiting)
//!
//! `loginguard` protects password logins against brute force. The host
//! application's login route asks it before verifying a password, reports
//! each failure and clears the account on success.
//!
//! ## Lockout
//!
//! Failed attempts are counted per normalized email. After `max_attempts`
//! failures (default 5) the account is locked for `lockout_duration`
//! (default 15 minutes). Records live in Postgres (`login_attempts`), or in
//! memory when no DSN is configured.
//!
//! ## Fail closed
//!
//! If the attempt store cannot be reached every lockout endpoint answers
//! `503 Please try again later`; a login must never proceed on that answer.
//!
//! ## Rate limiting
//!
//! Verification-code issuance is limited per email with an in-process
//! fixed window (default 3 per hour).
//!
//! ## Admin
//!
//! With `--admin-token` set, `/v1/admin/lockouts*` lists, inspects and clears
//! lockouts behind a bearer token.

pub mod api;
pub mod cli;
pub mod security;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
