//! # Innera
//!
//! Session and coordination for a private journaling service: token
//! issuance and rotation, partner pairing, circle invites and membership,
//! and concurrency-safe entry edits.
//!
//! ## Overview
//!
//! Every write that could race goes through a guarded primitive:
//!
//! - **Tokens**: refresh tokens are single-use. Rotation deletes the live
//!   record atomically, so of two concurrent refreshes exactly one wins.
//! - **Partner pairing**: invite codes are consumed with an atomic
//!   get-and-delete, and the link is created only if neither user has one.
//! - **Circle invites**: the usage counter is incremented conditionally,
//!   inside the same transaction as the membership insert.
//! - **Entries**: updates carry the version the client read; a stale
//!   version is rejected, never overwritten.
//!
//! Reads are filtered through the access evaluator in [`perms`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use innera::{InneraConfig, SqliteInnera};
//!
//! async fn example() -> innera::Result<()> {
//!     let config = InneraConfig::from_env()?;
//!     let app = SqliteInnera::open(config)?;
//!
//!     // Resolve a bearer token, then act as that user
//!     let principal = app.authenticate("eyJ...")?;
//!     let invite = app.pairing().create_invite(principal.user_id).await?;
//!     println!("share {}", invite.invite_code);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `innera::core` - Domain records and error kinds
//! - `innera::store` - Relational and key-value storage
//! - `innera::session` - Token codec and revocation registry
//! - `innera::perms` - Access evaluation

pub mod api;
pub mod app;
pub mod circles;
pub mod config;
pub mod entries;
pub mod error;
pub mod notify;
pub mod pairing;
pub mod viewer;

// Re-export component crates
pub use innera_core as core;
pub use innera_perms as perms;
pub use innera_session as session;
pub use innera_store as store;

// Re-export main types for convenience
pub use app::{Innera, MemoryInnera, SqliteInnera};
pub use circles::{CircleInviteCoordinator, CirclePolicy, CreatedCircle, JoinedCircle};
pub use config::{ConfigError, InneraConfig, InvitePolicy};
pub use entries::EntryConcurrencyGuard;
pub use error::{InneraError, Result};
pub use notify::{Notifier, StoreNotifier};
pub use pairing::{PairingCoordinator, PartnerInvite, PartnerView};

pub use innera_core::{
    Circle, CircleId, CircleRole, Entry, EntryId, EntryPatch, HistoryPolicy, Membership, NewEntry,
    PartnerLink, Principal, User, UserId, Visibility,
};
pub use innera_perms::Viewer;
pub use innera_session::{TokenPair, TokenService};

/// A fresh opaque invite code: 16 random bytes, hex-encoded.
pub(crate) fn generate_code() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_hex() {
        let a = generate_code();
        let b = generate_code();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
