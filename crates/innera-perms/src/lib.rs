//! # Innera Permissions
//!
//! Pure access decisions for entries and circles.
//!
//! ## Overview
//!
//! Every function here is a pure predicate over already-loaded state: an
//! [`Entry`](innera_core::Entry) and a [`Viewer`] describing the requesting
//! user's partner link and circle memberships. No I/O happens in this crate;
//! callers fetch the rows first and then ask.
//!
//! Unknown visibility values are denied for everyone but the author.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use innera_perms::{can_view, require, Viewer};
//!
//! # fn example(entry: innera_core::Entry, viewer: Viewer) -> innera_perms::Result<()> {
//! require(can_view(&entry, &viewer), "view entry")?;
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod error;
pub mod rules;
pub mod viewer;

pub use access::can_view;
pub use error::{require, PermsError, Result};
pub use rules::{
    can_delete, can_edit, can_kick_member, can_manage_circle, can_post_to_circle, can_restore,
};
pub use viewer::{MembershipContext, PartnerContext, Viewer};
