//! # Innera Store
//!
//! Storage abstraction for Innera. Provides trait-based interfaces for the
//! relational store and the TTL key-value store, with SQLite and in-memory
//! implementations of each.
//!
//! ## Overview
//!
//! Coordination protocols never take application-level locks. Every
//! multi-step invariant is enforced by a store-native primitive instead:
//!
//! - [`KvStore::get_del`] and [`KvStore::del`] are atomic read-and-remove /
//!   delete-and-check operations, the serialization point for single-use codes
//!   and refresh-token rotation.
//! - [`KvStore::set_if_absent`] is create-if-absent.
//! - [`Store::transaction`] runs a closure over [`StoreTx`] atomically; the
//!   guarded writes on [`StoreTx`] return affected-row counts so a lost race
//!   is observable.
//!
//! ## Key Types
//!
//! - [`Store`], [`StoreTx`] - Relational store and its transaction handle
//! - [`KvStore`] - TTL key-value store
//! - [`SqliteStore`], [`SqliteKv`] - SQLite-backed implementations (one connection can back both)
//! - [`MemoryStore`], [`MemoryKv`] - In-memory implementations for tests
//! - [`LazyKv`] - A key-value handle that connects on first use
//!
//! ## Usage
//!
//! ```rust,no_run
//! use innera_store::{KvStore, SqliteStore, Store, StoreExt};
//! use std::time::Duration;
//!
//! async fn example() -> innera_store::Result<()> {
//!     let store = SqliteStore::open("innera.db")?;
//!     let kv = store.kv();
//!
//!     kv.set("refresh_token:u:j", "1", Duration::from_secs(60)).await?;
//!     assert!(kv.del("refresh_token:u:j").await?);
//!
//!     let circles = store
//!         .transaction(|tx| tx.count_active_members(innera_core::CircleId::new()))
//!         .await?;
//!     assert_eq!(circles, 0);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod lazy;
pub mod memory;
pub mod memory_kv;
pub mod migration;
pub mod sqlite;
pub mod sqlite_kv;
pub mod traits;

pub use error::{Result, StoreError};
pub use lazy::LazyKv;
pub use memory::MemoryStore;
pub use memory_kv::MemoryKv;
pub use sqlite::SqliteStore;
pub use sqlite_kv::SqliteKv;
pub use traits::{KvStore, ScanPage, Store, StoreExt, StoreTx, VersionedUpdate};

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
