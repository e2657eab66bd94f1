//! Error types for the facade.

use innera_core::{CoreError, ErrorKind};
use innera_perms::PermsError;
use innera_session::SessionError;
use innera_store::StoreError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during Innera operations.
///
/// Every variant classifies into one [`ErrorKind`] through
/// [`InneraError::kind`]; that is all the request boundary looks at.
#[derive(Debug, Error)]
pub enum InneraError {
    /// Token or session failure.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Permission error.
    #[error("{0}")]
    Permission(#[from] PermsError),

    /// A domain value was malformed.
    #[error("{0}")]
    Invalid(#[from] CoreError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// A guarded write lost a race or a state transition was not allowed.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    /// The request ran past its deadline.
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl InneraError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        InneraError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        InneraError::Conflict(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        InneraError::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        InneraError::Forbidden(msg.into())
    }

    /// The failure class reported to the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            InneraError::Session(e) if e.is_unauthorized() => ErrorKind::Unauthorized,
            InneraError::Session(_) => ErrorKind::Internal,
            InneraError::Store(_) => ErrorKind::Internal,
            InneraError::Permission(PermsError::PermissionDenied(_)) => ErrorKind::Forbidden,
            InneraError::Permission(PermsError::CoreError(_)) => ErrorKind::BadRequest,
            InneraError::Invalid(_) => ErrorKind::BadRequest,
            InneraError::Config(_) => ErrorKind::Internal,
            InneraError::Unauthorized(_) => ErrorKind::Unauthorized,
            InneraError::Forbidden(_) => ErrorKind::Forbidden,
            InneraError::NotFound(_) => ErrorKind::NotFound,
            InneraError::Conflict(_) => ErrorKind::Conflict,
            InneraError::BadRequest(_) => ErrorKind::BadRequest,
            InneraError::DeadlineExceeded => ErrorKind::Internal,
        }
    }
}

/// Result type for Innera operations.
pub type Result<T> = std::result::Result<T, InneraError>;
