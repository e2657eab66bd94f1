//! # Innera Core
//!
//! Pure domain types for the Innera session and coordination subsystem:
//! entries, partner links, circles, memberships, invites, and the error
//! taxonomy shared by every crate in the workspace.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Entry`] - A journal entry with an opaque encrypted body and a version stamp
//! - [`Visibility`] - Access tier of an entry
//! - [`PartnerLink`] - A pairing between two users
//! - [`Circle`], [`Membership`], [`CircleInvite`] - Circle state
//! - [`ErrorKind`] - The failure taxonomy reported at the request boundary
//!
//! ## Invariants
//!
//! - An entry carries a circle id iff its visibility is circle-scoped.
//!   See [`Entry::validate_scope`].
//! - An invite's `used_count` never exceeds `max_uses`.

/// Declares a closed string-valued enum with `as_str`, `FromStr` and `Display`.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::error::CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err($crate::error::CoreError::UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub mod circle;
pub mod entry;
pub mod error;
pub mod notification;
pub mod partner;
pub mod types;
pub mod user;

pub use circle::{
    Circle, CircleInvite, CircleRole, CircleStatus, HistoryPolicy, Membership, MembershipStatus,
};
pub use entry::{Entry, EntryPatch, NewEntry, Visibility};
pub use error::{CoreError, ErrorKind};
pub use notification::{Notification, NotificationKind};
pub use partner::{LinkRole, LinkStatus, PartnerLink};
pub use types::{CircleId, EntryId, InviteId, LinkId, MembershipId, NotificationId, UserId};
pub use user::{Principal, User};
