//! Normalized email identity used as the lockout key.

use regex::Regex;
use std::fmt;

use super::SecurityError;

const MAX_EMAIL_LENGTH: usize = 254;

/// Lower-cased, trimmed email address that passed a basic format check.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Normalize and validate an email.
    ///
    /// # Errors
    /// Returns `SecurityError::InvalidIdentity` if the email is empty, too long
    /// or not shaped like `local@domain.tld`.
    pub fn parse(email: &str) -> Result<Self, SecurityError> {
        let normalized = normalize_email(email);
        if normalized.is_empty() {
            return Err(SecurityError::InvalidIdentity("empty email".to_string()));
        }
        if normalized.len() > MAX_EMAIL_LENGTH {
            return Err(SecurityError::InvalidIdentity("email too long".to_string()));
        }
        if !valid_email(&normalized) {
            return Err(SecurityError::InvalidIdentity(format!(
                "malformed email: {normalized}"
            )));
        }
        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}
