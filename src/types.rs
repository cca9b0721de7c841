//! Error types for canopy

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CanopyError {
    #[error("Unsupported platform: {0}")]
    Unsupported(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Subscription failed: {0}")]
    Subscription(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Cache write failed: {0}")]
    CacheWrite(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CanopyError>;

impl CanopyError {
    /// Terminal errors require user action outside this system; retrying
    /// or re-prompting cannot clear them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CanopyError::Unsupported(_) | CanopyError::PermissionDenied(_)
        )
    }
}
