//! Tenant-scoped cache service.
//!
//! Every operation follows the same discipline:
//!
//! 1. Ask the circuit breaker for permission; if refused, return the
//!    operation's "unavailable" result (`None` / `false`) without touching
//!    the backing store.
//! 2. Run the backing-store call and record its outcome in the breaker.
//! 3. On error, log and return the "unavailable" result. Errors never
//!    propagate to the caller.

use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::codec::{self, Decoded};
use crate::error::StoreResult;
use crate::key::{KeyFormatter, TenantContext};
use crate::metrics;
use crate::settings::CacheSettings;
use crate::store::BackingStore;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct Inner {
    store: Arc<dyn BackingStore>,
    breaker: Arc<CircuitBreaker>,
    default_ttl: Duration,
}

/// Cache facade combining key scoping, encoding and circuit breaking in
/// front of a [`BackingStore`]. Cheap to clone.
#[derive(Clone)]
pub struct CacheService {
    inner: Arc<Inner>,
}

impl CacheService {
    pub fn builder(store: Arc<dyn BackingStore>) -> CacheServiceBuilder {
        CacheServiceBuilder {
            store,
            breaker: None,
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Service configured from [`CacheSettings`], with a fresh breaker.
    pub fn from_settings(store: Arc<dyn BackingStore>, settings: &CacheSettings) -> Self {
        Self::builder(store)
            .with_breaker_config(settings.breaker_config())
            .with_default_ttl(settings.default_ttl())
            .build()
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.inner.breaker
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner.store.name()
    }

    /// `false` while the circuit is open and inside its recovery window.
    pub fn is_available(&self) -> bool {
        self.inner.breaker.is_available()
    }

    /// Fetch and decode a value. Raw or mismatched payloads count as absent.
    pub async fn get<T: DeserializeOwned>(&self, ctx: &TenantContext, key: &str) -> Option<T> {
        match self.get_decoded(ctx, key).await? {
            Decoded::Value(value) => Some(value),
            Decoded::Raw(_) => {
                tracing::debug!(key = %key, "Cached payload is not of the requested type");
                None
            }
        }
    }

    /// Fetch a payload, keeping undecodable payloads as raw bytes.
    pub async fn get_decoded<T: DeserializeOwned>(
        &self,
        ctx: &TenantContext,
        key: &str,
    ) -> Option<Decoded<T>> {
        let key = KeyFormatter::format(key, ctx);
        let payload = self.guarded("get", &key, self.inner.store.get(&key)).await?;
        match payload {
            Some(bytes) => {
                tracing::debug!(key = %key, "cache hit");
                metrics::record_cache_hit("service");
                Some(codec::decode(&bytes))
            }
            None => {
                tracing::debug!(key = %key, "cache miss");
                metrics::record_cache_miss("service");
                None
            }
        }
    }

    /// Encode and store a value.
    ///
    /// `None` or a zero `ttl` uses the service TTL. Other sub-second values
    /// are rounded up to one second.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        ctx: &TenantContext,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let key = KeyFormatter::format(key, ctx);
        let payload = match codec::encode(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to encode value for cache");
                metrics::record_cache_error("encode");
                return false;
            }
        };
        self.write(&key, &payload, ttl).await
    }

    /// Store a byte string as-is.
    pub async fn set_raw(
        &self,
        ctx: &TenantContext,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> bool {
        let key = KeyFormatter::format(key, ctx);
        self.write(&key, &codec::encode_raw(value), ttl).await
    }

    pub async fn delete(&self, ctx: &TenantContext, key: &str) -> bool {
        let key = KeyFormatter::format(key, ctx);
        self.guarded(
            "delete",
            &key,
            self.inner.store.delete(std::slice::from_ref(&key)),
        )
        .await
        .is_some()
    }

    pub async fn exists(&self, ctx: &TenantContext, key: &str) -> bool {
        let key = KeyFormatter::format(key, ctx);
        self.guarded("exists", &key, self.inner.store.exists(&key))
            .await
            .unwrap_or(false)
    }

    /// Atomically add `amount` to a counter, returning the new value.
    pub async fn increment(&self, ctx: &TenantContext, key: &str, amount: i64) -> Option<i64> {
        let key = KeyFormatter::format(key, ctx);
        self.guarded("increment", &key, self.inner.store.increment_by(&key, amount))
            .await
    }

    /// Remaining lifetime in seconds; `None` if missing, persistent or expired.
    pub async fn get_ttl(&self, ctx: &TenantContext, key: &str) -> Option<u64> {
        let key = KeyFormatter::format(key, ctx);
        let ttl = self
            .guarded("ttl", &key, self.inner.store.ttl(&key))
            .await?;
        u64::try_from(ttl).ok().filter(|secs| *secs > 0)
    }

    /// Delete every key under the tenant-scoped `prefix`.
    pub async fn clear_prefix(&self, ctx: &TenantContext, prefix: &str) -> bool {
        let prefix = KeyFormatter::format(prefix, ctx);
        let pattern = KeyFormatter::scan_pattern(&prefix);
        let Some(keys) = self
            .guarded("scan", &prefix, self.inner.store.scan_keys(&pattern))
            .await
        else {
            return false;
        };
        if keys.is_empty() {
            return true;
        }
        let cleared = self
            .guarded("delete", &prefix, self.inner.store.delete(&keys))
            .await
            .is_some();
        if cleared {
            tracing::debug!(prefix = %prefix, count = keys.len(), "cleared cache prefix");
        }
        cleared
    }

    async fn write(&self, key: &str, payload: &[u8], ttl: Option<Duration>) -> bool {
        let ttl_secs = ttl
            .filter(|ttl| !ttl.is_zero())
            .unwrap_or(self.inner.default_ttl)
            .as_secs()
            .max(1);
        let stored = self
            .guarded(
                "set",
                key,
                self.inner.store.set_with_expiry(key, ttl_secs, payload),
            )
            .await
            .is_some();
        if stored {
            tracing::debug!(key = %key, ttl_secs, "cache set");
        }
        stored
    }

    /// Run one backing-store call under the circuit breaker.
    async fn guarded<T>(
        &self,
        op: &'static str,
        key: &str,
        call: impl Future<Output = StoreResult<T>>,
    ) -> Option<T> {
        let breaker = &self.inner.breaker;
        if !breaker.try_acquire() {
            tracing::warn!(op, key = %key, "Circuit breaker is open, skipping cache operation");
            metrics::record_cache_skipped(op);
            return None;
        }

        match call.await {
            Ok(value) => {
                breaker.record_success();
                Some(value)
            }
            Err(e) => {
                breaker.record_failure();
                metrics::record_cache_error(op);
                if e.is_unavailable() {
                    tracing::warn!(op, key = %key, error = %e, "Backing store unavailable");
                } else {
                    tracing::warn!(op, key = %key, error = %e, "Cache operation failed");
                }
                None
            }
        }
    }
}

pub struct CacheServiceBuilder {
    store: Arc<dyn BackingStore>,
    breaker: Option<Arc<CircuitBreaker>>,
    default_ttl: Duration,
}

impl CacheServiceBuilder {
    /// Share an existing breaker (e.g. one constructed at process start).
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn with_breaker_config(mut self, cfg: CircuitBreakerConfig) -> Self {
        self.breaker = Some(Arc::new(CircuitBreaker::new(cfg)));
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn build(self) -> CacheService {
        CacheService {
            inner: Arc::new(Inner {
                store: self.store,
                breaker: self.breaker.unwrap_or_default(),
                default_ttl: self.default_ttl,
            }),
        }
    }
}
