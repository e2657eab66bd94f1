//! Error types for Innera Core.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while constructing or parsing domain values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("circle-scoped visibility requires a circle id")]
    MissingCircle,

    #[error("visibility {0} must not carry a circle id")]
    UnexpectedCircle(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

/// Failure classes reported at the request boundary.
///
/// Every error in the workspace classifies into exactly one kind. The kind
/// determines the HTTP status and the stable code clients switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Missing, invalid, expired, or revoked credential.
    Unauthorized,
    /// Authenticated but not permitted.
    Forbidden,
    NotFound,
    /// Concurrent mutation or state machine violation. Clients should refetch and retry.
    Conflict,
    /// A precondition the caller could have avoided.
    BadRequest,
    /// Store unavailable or unexpected failure.
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind.
    pub const fn status(self) -> u16 {
        match self {
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::BadRequest => 400,
            ErrorKind::Internal => 500,
        }
    }

    /// Stable machine-readable code.
    pub const fn code(self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }

    /// Whether this is a server-side failure.
    pub const fn is_server_error(self) -> bool {
        matches!(self, ErrorKind::Internal)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
