//! In-memory TTL key-value store.
//!
//! Expiry is measured with `tokio::time::Instant`, so tests running under a
//! paused clock can advance past a TTL without sleeping.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{Result, StoreError};
use crate::traits::{KvStore, ScanPage};

struct Slot {
    value: String,
    expires_at: Instant,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory [`KvStore`]. Every operation runs under one mutex, which makes
/// each single-key operation atomic.
#[derive(Default)]
pub struct MemoryKv {
    slots: Mutex<BTreeMap<String, Slot>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Slot>>> {
        self.slots.lock().map_err(StoreError::poisoned)
    }

    /// Number of live keys.
    pub fn len(&self) -> Result<usize> {
        let now = Instant::now();
        Ok(self.lock()?.values().filter(|s| s.is_live(now)).count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let slots = self.lock()?;
        Ok(slots
            .get(key)
            .filter(|s| s.is_live(now))
            .map(|s| s.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        self.lock()?.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut slots = self.lock()?;
        if slots.get(key).is_some_and(|s| s.is_live(now)) {
            return Ok(false);
        }
        slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        let slots = self.lock()?;
        Ok(slots
            .get(key)
            .filter(|s| s.is_live(now))
            .map(|s| s.expires_at - now))
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut slots = self.lock()?;
        Ok(slots.remove(key).filter(|s| s.is_live(now)).map(|s| s.value))
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut slots = self.lock()?;
        Ok(slots.remove(key).is_some_and(|s| s.is_live(now)))
    }

    async fn del_many(&self, keys: &[String]) -> Result<u64> {
        let now = Instant::now();
        let mut slots = self.lock()?;
        let removed = keys
            .iter()
            .filter_map(|k| slots.remove(k))
            .filter(|s| s.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn scan(&self, prefix: &str, after: Option<&str>, count: usize) -> Result<ScanPage> {
        let now = Instant::now();
        let slots = self.lock()?;
        let lower = match after {
            Some(cursor) if cursor >= prefix => Bound::Excluded(cursor.to_string()),
            _ => Bound::Included(prefix.to_string()),
        };

        let mut keys: Vec<String> = slots
            .range((lower, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .filter(|(_, s)| s.is_live(now))
            .map(|(k, _)| k.clone())
            .take(count.saturating_add(1))
            .collect();

        let next = if keys.len() > count {
            keys.truncate(count);
            keys.last().cloned()
        } else {
            None
        };
        Ok(ScanPage { keys, next })
    }
}
