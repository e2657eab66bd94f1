//! Error types for the permissions module.

use thiserror::Error;

/// Errors that can occur during permission checks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PermsError {
    /// The viewer may not perform the action.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] innera_core::CoreError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;

/// Turn a rule decision into a result.
pub fn require(allowed: bool, action: &str) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(PermsError::PermissionDenied(action.to_string()))
    }
}
