//! # Innera Testkit
//!
//! Testing utilities for Innera.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: an in-memory app with a recording notifier and helpers for
//!   users, circles, invites, and entries
//! - **Generators**: Proptest strategies for viewers, entries, and enums
//! - **Scenario tests** under `tests/` that drive the whole stack
//!
//! ## Test Fixtures
//!
//! ```rust
//! use innera_testkit::TestFixture;
//!
//! # tokio_test_block(async {
//! let fixture = TestFixture::new();
//! let alice = fixture.user("alice").await;
//! let entry = fixture.private_entry(alice.id).await;
//! assert_eq!(entry.version, 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use innera_testkit::generators::{entry_with, unrecognized_visibility, viewer};
//!
//! proptest! {
//!     #[test]
//!     fn unknown_visibility_is_hidden(entry in entry_with(unrecognized_visibility())) {
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{init_tracing, RecordingNotifier, TestFixture};
