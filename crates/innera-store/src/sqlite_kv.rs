//! SQLite implementation of the KvStore trait.
//!
//! Keys live in the `kv` table with an absolute expiry in Unix milliseconds.
//! Every statement filters on `expires_at > now`, so dead rows are invisible
//! until [`SqliteKv::purge_expired`] or an overwrite removes them.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::now_millis;
use crate::traits::{KvStore, ScanPage};

/// SQLite-backed [`KvStore`].
///
/// Cloning is cheap and shares the connection.
#[derive(Clone)]
pub struct SqliteKv {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKv {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_shared(Arc::new(Mutex::new(conn))))
    }

    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self::from_shared(Arc::new(Mutex::new(conn))))
    }

    /// Wrap an already-migrated connection.
    pub(crate) fn from_shared(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection, i64) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(StoreError::poisoned)?;
            f(&conn, now_millis())
        })
        .await
        .map_err(StoreError::join)?
    }

    /// Delete dead rows. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        self.run(|conn, now| {
            let removed = conn.execute("DELETE FROM kv WHERE expires_at <= ?1", params![now])?;
            Ok(removed as u64)
        })
        .await
    }
}

fn expiry(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.run(move |conn, now| {
            Ok(conn
                .query_row(
                    "SELECT value FROM kv WHERE key = ?1 AND expires_at > ?2",
                    params![key, now],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let (key, value) = (key.to_string(), value.to_string());
        self.run(move |conn, now| {
            conn.execute(
                "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
                params![key, value, expiry(now, ttl)],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let (key, value) = (key.to_string(), value.to_string());
        self.run(move |conn, now| {
            // A dead row may be overwritten; a live one never is.
            let changed = conn.execute(
                "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
                 WHERE kv.expires_at <= ?4",
                params![key, value, expiry(now, ttl), now],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let key = key.to_string();
        self.run(move |conn, now| {
            let expires_at: Option<i64> = conn
                .query_row(
                    "SELECT expires_at FROM kv WHERE key = ?1 AND expires_at > ?2",
                    params![key, now],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(expires_at.map(|at| Duration::from_millis((at - now) as u64)))
        })
        .await
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.run(move |conn, now| {
            let row: Option<(String, i64)> = conn
                .query_row(
                    "DELETE FROM kv WHERE key = ?1 RETURNING value, expires_at",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            Ok(row.filter(|(_, at)| *at > now).map(|(value, _)| value))
        })
        .await
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.run(move |conn, now| {
            let expires_at: Option<i64> = conn
                .query_row(
                    "DELETE FROM kv WHERE key = ?1 RETURNING expires_at",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(expires_at.is_some_and(|at| at > now))
        })
        .await
    }

    async fn del_many(&self, keys: &[String]) -> Result<u64> {
        let keys = keys.to_vec();
        self.run(move |conn, now| {
            let mut stmt = conn.prepare("DELETE FROM kv WHERE key = ?1 AND expires_at > ?2")?;
            let mut removed = 0u64;
            for key in &keys {
                removed += stmt.execute(params![key, now])? as u64;
            }
            Ok(removed)
        })
        .await
    }

    async fn scan(&self, prefix: &str, after: Option<&str>, count: usize) -> Result<ScanPage> {
        let prefix = prefix.to_string();
        let after = after.unwrap_or_default().to_string();
        self.run(move |conn, now| {
            let prefix_len = prefix.chars().count() as i64;
            let limit = i64::try_from(count.saturating_add(1)).unwrap_or(i64::MAX);
            let mut stmt = conn.prepare(
                "SELECT key FROM kv
                 WHERE substr(key, 1, ?2) = ?1 AND key > ?3 AND expires_at > ?4
                 ORDER BY key
                 LIMIT ?5",
            )?;
            let mut keys = stmt
                .query_map(params![prefix, prefix_len, after, now, limit], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;

            let next = if keys.len() > count {
                keys.truncate(count);
                keys.last().cloned()
            } else {
                None
            };
            Ok(ScanPage { keys, next })
        })
        .await
    }
}
