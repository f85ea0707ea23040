//! Error taxonomy for the login security layer.

/// Errors surfaced by the attempt store and the security service.
///
/// "Not locked" is not an error: status queries return
/// [`LockoutInfo::NotLocked`](super::LockoutInfo::NotLocked) instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    /// The durable store could not be reached or returned an unusable row.
    /// Callers must deny the login when they see this.
    #[error("attempt storage unavailable: {0}")]
    StorageUnavailable(String),
    /// The email did not pass validation; no storage was touched.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
}

impl SecurityError {
    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}
