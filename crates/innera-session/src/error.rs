//! Error types for the session module.

use thiserror::Error;

/// Errors that can occur while issuing or checking credentials.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The token failed verification. Deliberately carries no detail so that
    /// expired, tampered, and misdirected tokens are indistinguishable.
    #[error("invalid or expired token")]
    InvalidToken,

    /// The refresh token was valid but has already been rotated or revoked.
    #[error("refresh token has already been revoked")]
    AlreadyRevoked,

    /// The signing secret was rejected at startup.
    #[error("signing secret rejected: {0}")]
    Secret(#[from] SecretError),

    /// Claims could not be encoded.
    #[error("token encoding failed: {0}")]
    Encoding(String),

    /// Key-value store failure.
    #[error("store error: {0}")]
    Store(#[from] innera_store::StoreError),
}

impl SessionError {
    /// Whether the caller presented a bad credential, as opposed to the
    /// service failing.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SessionError::InvalidToken | SessionError::AlreadyRevoked)
    }
}

/// Reasons a signing secret is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    #[error("JWT_SECRET is not set")]
    Missing,

    #[error("secret must be at least {min} bytes, got {len}")]
    TooShort { len: usize, min: usize },

    #[error("secret is still a known placeholder value")]
    Placeholder,
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
