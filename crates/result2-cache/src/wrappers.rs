//! Handler-level memoization and invalidation.
//!
//! ```ignore
//! async fn class_report(State(state): State<AppState>, scope: RequestScope) -> Json<Report> {
//!     let report = state
//!         .report_cache
//!         .call(&scope, || build_report(&state.db, &scope))
//!         .await;
//!     Json(report)
//! }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Serialize, de::DeserializeOwned};
use tokio::time::Instant;

use crate::key::{KeyFormatter, TenantContext};
use crate::metrics;
use crate::service::CacheService;
use crate::settings::CacheSettings;

const DEFAULT_MIN_COST: Duration = Duration::from_millis(100);

/// Path, query and tenant of the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestScope {
    pub path: String,
    pub query: Option<String>,
    pub tenant: TenantContext,
}

impl RequestScope {
    pub fn new(path: impl Into<String>, query: Option<&str>, tenant: TenantContext) -> Self {
        Self {
            path: path.into(),
            query: query.map(str::to_string),
            tenant,
        }
    }
}

impl<S> FromRequestParts<S> for RequestScope
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant = parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .unwrap_or_default();
        Ok(Self::new(parts.uri.path(), parts.uri.query(), tenant))
    }
}

/// Caches the result of an expensive computation per request scope.
///
/// Only results that took longer than `min_cost` to produce are stored.
#[derive(Clone)]
pub struct Memoize {
    cache: CacheService,
    name: String,
    ttl: Option<Duration>,
    min_cost: Duration,
}

impl Memoize {
    pub fn new(cache: CacheService, name: impl Into<String>) -> Self {
        Self {
            cache,
            name: name.into(),
            ttl: None,
            min_cost: DEFAULT_MIN_COST,
        }
    }

    /// Memoizer using the configured cost threshold.
    pub fn from_settings(
        cache: CacheService,
        name: impl Into<String>,
        settings: &CacheSettings,
    ) -> Self {
        Self::new(cache, name).with_min_cost(settings.memoize_min_cost())
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_min_cost(mut self, min_cost: Duration) -> Self {
        self.min_cost = min_cost;
        self
    }

    pub fn key_for(&self, scope: &RequestScope) -> String {
        KeyFormatter::memo_key(
            &self.name,
            &scope.path,
            scope.query.as_deref(),
            &scope.tenant,
        )
    }

    pub async fn call<T, F, Fut>(&self, scope: &RequestScope, f: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.cache.is_available() {
            metrics::record_cache_skipped("memoize");
            return f().await;
        }

        let key = self.key_for(scope);
        if let Some(hit) = self.cache.get::<T>(&scope.tenant, &key).await {
            metrics::record_cache_hit("memoize");
            return hit;
        }
        metrics::record_cache_miss("memoize");

        let started = Instant::now();
        let value = f().await;
        let elapsed = started.elapsed();

        if elapsed > self.min_cost {
            self.cache.set(&scope.tenant, &key, &value, self.ttl).await;
        } else {
            tracing::trace!(
                key = %key,
                elapsed_ms = elapsed.as_millis() as u64,
                "Result too cheap to memoize"
            );
        }
        value
    }
}

/// Clears a tenant-scoped key prefix after a successful call.
#[derive(Clone)]
pub struct Invalidate {
    cache: CacheService,
    prefix: String,
}

impl Invalidate {
    pub fn new(cache: CacheService, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub async fn call<T, E, F, Fut>(&self, ctx: &TenantContext, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let value = f().await?;
        if !self.cache.clear_prefix(ctx, &self.prefix).await {
            tracing::warn!(prefix = %self.prefix, "Cache invalidation failed");
        }
        Ok(value)
    }
}
