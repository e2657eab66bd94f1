//! # Innera Session
//!
//! Access and refresh tokens for Innera.
//!
//! ## Overview
//!
//! An access token is a short-lived HS256 JWT verified statelessly. A refresh
//! token is a long-lived JWT whose id (`jti`) is recorded in a TTL key-value
//! store; the record's existence is what makes the token redeemable.
//!
//! Rotation is single use. The record is removed with one delete-and-check
//! call before a new pair is issued, so two requests presenting the same
//! refresh token can never both succeed.
//!
//! ## Key Types
//!
//! - [`SigningSecret`] - Validated signing key, constructed once at startup
//! - [`TokenCodec`] - Compact JWT signing and verification
//! - [`RevocationRegistry`] - Live refresh-token ids per user
//! - [`TokenService`] - Issue, rotate, and revoke
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use innera_session::{Environment, SessionConfig, SigningSecret, TokenService};
//! use innera_store::MemoryKv;
//!
//! # async fn example(user: innera_core::Principal) -> innera_session::Result<()> {
//! let secret = SigningSecret::new(std::env::var("JWT_SECRET").unwrap_or_default(), Environment::Development)?;
//! let tokens = TokenService::new(secret, SessionConfig::new(), Arc::new(MemoryKv::new()));
//!
//! let pair = tokens.issue_pair(&user).await?;
//! let user_id = tokens.redeem_refresh(&pair.refresh_token).await?;
//! # let _ = user_id;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod registry;
pub mod secret;
pub mod service;

pub use codec::{AccessClaims, Audience, Claims, RefreshClaims, TokenCodec};
pub use config::{SessionConfig, ACCESS_TOKEN_TTL, DEFAULT_ISSUER, REFRESH_TOKEN_TTL};
pub use error::{Result, SecretError, SessionError};
pub use registry::{RevocationRegistry, RevokeAllReport, REFRESH_TOKEN_PREFIX};
pub use secret::{Environment, SigningSecret, KNOWN_PLACEHOLDERS, MIN_SECRET_LEN};
pub use service::{TokenPair, TokenService};
