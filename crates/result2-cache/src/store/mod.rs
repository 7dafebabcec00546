//! Backing store abstraction.
//!
//! ## Implementations
//!
//! - [`RedisStore`]: shared key-value store over a deadpool connection pool
//! - [`MemoryStore`]: in-process DashMap emulating the same semantics, used
//!   when Redis is disabled or unreachable at startup, and in tests
//!
//! The trait describes the remote store only. Tenant scoping, encoding and
//! circuit breaking live in [`CacheService`](crate::CacheService).

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::{RedisStore, RedisStoreConfig};

use async_trait::async_trait;

use crate::error::StoreResult;

/// Sentinel returned by [`BackingStore::ttl`] for a missing key.
pub const TTL_MISSING: i64 = -2;
/// Sentinel returned by [`BackingStore::ttl`] for a key without expiry.
pub const TTL_PERSISTENT: i64 = -1;

/// Contract every backing store must satisfy.
///
/// Timeouts are the implementation's responsibility; callers assume every
/// method completes or fails in bounded time.
#[async_trait]
pub trait BackingStore: Send + Sync {
    /// Fetch the payload stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store `value` under `key`, expiring after `ttl_secs` seconds.
    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: &[u8]) -> StoreResult<()>;

    /// Remove all `keys`. Missing keys are ignored.
    async fn delete(&self, keys: &[String]) -> StoreResult<()>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Atomically add `amount` to the integer stored under `key`, creating it
    /// at zero first if missing. Returns the new value.
    async fn increment_by(&self, key: &str, amount: i64) -> StoreResult<i64>;

    /// Remaining lifetime in seconds, or [`TTL_MISSING`] / [`TTL_PERSISTENT`].
    async fn ttl(&self, key: &str) -> StoreResult<i64>;

    /// All keys matching a Redis glob `pattern`.
    async fn scan_keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Backend name for logs and health output.
    fn name(&self) -> &'static str;
}
