//! Shared test helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use result2_cache::{BackingStore, MemoryStore, StoreError, StoreResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// MemoryStore wrapper that counts calls and can be switched to fail.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Arc<AtomicBool>,
    gets: Arc<AtomicUsize>,
    sets: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Every call that reached the store, of any kind.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> StoreResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::connection("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BackingStore for FlakyStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.enter()?;
        self.inner.get(key).await
    }

    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: &[u8]) -> StoreResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.enter()?;
        self.inner.set_with_expiry(key, ttl_secs, value).await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        self.enter()?;
        self.inner.delete(keys).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.enter()?;
        self.inner.exists(key).await
    }

    async fn increment_by(&self, key: &str, amount: i64) -> StoreResult<i64> {
        self.enter()?;
        self.inner.increment_by(key, amount).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        self.enter()?;
        self.inner.ttl(key).await
    }

    async fn scan_keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.enter()?;
        self.inner.scan_keys(pattern).await
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}
