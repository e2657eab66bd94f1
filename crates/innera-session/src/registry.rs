//! Refresh-token revocation registry.
//!
//! One key per live refresh token, `refresh_token:{user_id}:{jti}`, each with
//! its own TTL. Existence means valid; deletion means revoked. The token
//! itself is never stored.

use std::sync::Arc;
use std::time::Duration;

use innera_core::UserId;
use innera_store::KvStore;

use crate::error::Result;

/// Namespace for refresh-token records.
pub const REFRESH_TOKEN_PREFIX: &str = "refresh_token:";

const PRESENT: &str = "1";

/// Outcome of a bulk revocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevokeAllReport {
    /// Records removed.
    pub revoked: u64,
    /// Scan pages read.
    pub iterations: usize,
    /// The iteration cap was reached before the scan finished; some
    /// sessions may still be live.
    pub truncated: bool,
}

/// Tracks which refresh-token ids are currently valid per user.
pub struct RevocationRegistry<K> {
    kv: Arc<K>,
    ttl: Duration,
    scan_batch: usize,
    max_iterations: usize,
}

impl<K: KvStore> RevocationRegistry<K> {
    pub fn new(kv: Arc<K>, ttl: Duration) -> Self {
        Self {
            kv,
            ttl,
            scan_batch: 100,
            max_iterations: 100,
        }
    }

    pub fn with_scan_limits(mut self, batch: usize, max_iterations: usize) -> Self {
        self.scan_batch = batch.max(1);
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn key(user: UserId, jti: &str) -> String {
        format!("{}{}:{}", REFRESH_TOKEN_PREFIX, user, jti)
    }

    fn user_prefix(user: UserId) -> String {
        format!("{}{}:", REFRESH_TOKEN_PREFIX, user)
    }

    /// Record a freshly issued refresh token. Other records keep their TTLs.
    pub async fn register(&self, user: UserId, jti: &str) -> Result<()> {
        self.kv.set(&Self::key(user, jti), PRESENT, self.ttl).await?;
        Ok(())
    }

    pub async fn is_live(&self, user: UserId, jti: &str) -> Result<bool> {
        Ok(self.kv.get(&Self::key(user, jti)).await?.is_some())
    }

    /// Delete-and-check. Of any number of concurrent callers for one record,
    /// exactly one sees `true`.
    pub async fn consume(&self, user: UserId, jti: &str) -> Result<bool> {
        Ok(self.kv.del(&Self::key(user, jti)).await?)
    }

    /// Idempotent delete.
    pub async fn revoke(&self, user: UserId, jti: &str) -> Result<()> {
        let existed = self.kv.del(&Self::key(user, jti)).await?;
        tracing::debug!(user_id = %user, existed, "refresh token revoked");
        Ok(())
    }

    /// Delete every record under the user's prefix in bounded pages.
    ///
    /// Stops after the configured number of pages and reports a truncated
    /// result instead of failing; whatever was seen is revoked.
    pub async fn revoke_all(&self, user: UserId) -> Result<RevokeAllReport> {
        let prefix = Self::user_prefix(user);
        let mut report = RevokeAllReport::default();
        let mut cursor: Option<String> = None;

        loop {
            if report.iterations >= self.max_iterations {
                report.truncated = true;
                break;
            }
            report.iterations += 1;

            let page = self
                .kv
                .scan(&prefix, cursor.as_deref(), self.scan_batch)
                .await?;
            if !page.keys.is_empty() {
                report.revoked += self.kv.del_many(&page.keys).await?;
            }
            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        if report.truncated {
            tracing::warn!(
                user_id = %user,
                revoked = report.revoked,
                iterations = report.iterations,
                "revoke-all hit its scan limit; some sessions may remain"
            );
        } else {
            tracing::debug!(user_id = %user, revoked = report.revoked, "all refresh tokens revoked");
        }
        Ok(report)
    }
}

impl<K> Clone for RevocationRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            kv: Arc::clone(&self.kv),
            ttl: self.ttl,
            scan_batch: self.scan_batch,
            max_iterations: self.max_iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use innera_store::MemoryKv;

    const TTL: Duration = Duration::from_secs(60);

    fn registry() -> (Arc<MemoryKv>, RevocationRegistry<MemoryKv>) {
        let kv = Arc::new(MemoryKv::new());
        (kv.clone(), RevocationRegistry::new(kv, TTL))
    }

    #[tokio::test]
    async fn test_register_and_consume_once() {
        let (_, reg) = registry();
        let user = UserId::new();
        reg.register(user, "j1").await.unwrap();
        assert!(reg.is_live(user, "j1").await.unwrap());
        assert!(reg.consume(user, "j1").await.unwrap());
        assert!(!reg.consume(user, "j1").await.unwrap());
        assert!(!reg.is_live(user, "j1").await.unwrap());
    }

    #[tokio::test]
    async fn test_key_layout() {
        let user = UserId::new();
        assert_eq!(
            RevocationRegistry::<MemoryKv>::key(user, "abc"),
            format!("refresh_token:{}:abc", user)
        );
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let (_, reg) = registry();
        let user = UserId::new();
        reg.revoke(user, "missing").await.unwrap();
        reg.register(user, "j1").await.unwrap();
        reg.revoke(user, "j1").await.unwrap();
        reg.revoke(user, "j1").await.unwrap();
        assert!(!reg.is_live(user, "j1").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_record_keeps_its_own_ttl() {
        let (_, reg) = registry();
        let user = UserId::new();
        reg.register(user, "old").await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        reg.register(user, "new").await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        assert!(!reg.is_live(user, "old").await.unwrap());
        assert!(reg.is_live(user, "new").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_all_only_touches_one_user() {
        let (kv, reg) = registry();
        let alice = UserId::new();
        let bob = UserId::new();
        for i in 0..250 {
            reg.register(alice, &format!("a{}", i)).await.unwrap();
        }
        reg.register(bob, "b0").await.unwrap();

        let report = reg.revoke_all(alice).await.unwrap();
        assert_eq!(report.revoked, 250);
        assert!(!report.truncated);
        assert!(report.iterations >= 3);
        assert!(reg.is_live(bob, "b0").await.unwrap());
        assert_eq!(kv.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_revoke_all_truncates_at_cap() {
        let (kv, reg) = registry();
        let reg = reg.with_scan_limits(2, 2);
        let user = UserId::new();
        for i in 0..10 {
            reg.register(user, &format!("j{}", i)).await.unwrap();
        }

        let report = reg.revoke_all(user).await.unwrap();
        assert!(report.truncated);
        assert_eq!(report.iterations, 2);
        assert_eq!(report.revoked, 4);
        assert_eq!(kv.len().unwrap(), 6);

        let report = reg.with_scan_limits(100, 100).revoke_all(user).await.unwrap();
        assert_eq!(report.revoked, 6);
        assert!(!report.truncated);
    }
}
