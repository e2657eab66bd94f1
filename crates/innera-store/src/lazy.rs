//! Lazily-initialized key-value handle.
//!
//! The first operation opens the backend through the factory; every later
//! operation reuses it. Concurrent first callers wait on the same
//! initialization. A failed initialization is returned to the caller and the
//! next operation tries again.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::error::Result;
use crate::traits::{KvStore, ScanPage};

type Factory<K> = Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<K>> + Send>> + Send + Sync>;

/// A [`KvStore`] that connects on first use.
pub struct LazyKv<K> {
    cell: OnceCell<Arc<K>>,
    factory: Factory<K>,
}

impl<K: KvStore + 'static> LazyKv<K> {
    pub fn new<F, Fut>(factory: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<K>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            factory: Box::new(move || Box::pin(factory())),
        }
    }

    /// The connected backend, initializing it if needed.
    pub async fn handle(&self) -> Result<Arc<K>> {
        let kv = self
            .cell
            .get_or_try_init(|| async {
                tracing::debug!("initializing key-value store");
                (self.factory)().await.map(Arc::new)
            })
            .await?;
        Ok(kv.clone())
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

#[async_trait]
impl<K: KvStore + 'static> KvStore for LazyKv<K> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.handle().await?.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.handle().await?.set(key, value, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.handle().await?.set_if_absent(key, value, ttl).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        self.handle().await?.ttl(key).await
    }

    async fn get_del(&self, key: &str) -> Result<Option<String>> {
        self.handle().await?.get_del(key).await
    }

    async fn del(&self, key: &str) -> Result<bool> {
        self.handle().await?.del(key).await
    }

    async fn del_many(&self, keys: &[String]) -> Result<u64> {
        self.handle().await?.del_many(keys).await
    }

    async fn scan(&self, prefix: &str, after: Option<&str>, count: usize) -> Result<ScanPage> {
        self.handle().await?.scan(prefix, after, count).await
    }
}
