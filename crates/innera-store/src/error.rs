//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A uniqueness or integrity rule was violated.
    #[error("constraint violated: {0}")]
    Constraint(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The backend could not be reached or initialized.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// A lock guarding backend state was poisoned by a panicking holder.
    pub(crate) fn poisoned(e: impl std::fmt::Display) -> Self {
        StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
            Some(format!("mutex poisoned: {}", e)),
        ))
    }

    /// A blocking task did not run to completion.
    pub(crate) fn join(e: tokio::task::JoinError) -> Self {
        StoreError::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("spawn_blocking failed: {}", e)),
        ))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
