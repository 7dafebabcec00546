//! # result2-cache
//!
//! Tenant-scoped response and result cache for the Result2 server.
//!
//! ## Overview
//!
//! - [`CacheService`] scopes keys per tenant, encodes values and guards every
//!   backing-store call with a [`CircuitBreaker`]. Store failures never reach
//!   the caller: reads degrade to misses and writes report `false`.
//! - [`response_cache`] is an axum middleware caching successful `GET`
//!   responses per tenant, subject, path and query.
//! - [`Memoize`] and [`Invalidate`] wrap individual handler computations.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use result2_cache::{CacheService, CacheSettings, MemoryStore, ResponseCacheState, response_cache};
//!
//! let settings = CacheSettings::default();
//! let cache = CacheService::from_settings(Arc::new(MemoryStore::new()), &settings);
//! let state = ResponseCacheState::from_settings(cache, &settings);
//!
//! let app = Router::new()
//!     .route("/results", get(results))
//!     .layer(axum::middleware::from_fn_with_state(state, response_cache));
//! ```

pub mod breaker;
pub mod codec;
mod error;
pub mod key;
pub mod metrics;
pub mod middleware;
mod service;
mod settings;
pub mod store;
pub mod wrappers;

pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use codec::{Decoded, Format};
pub use error::{CodecError, StoreError, StoreResult};
pub use key::{KeyFormatter, TenantContext};
pub use middleware::{
    CacheStatus, CachedResponse, PathPolicy, PreOutcome, ResponseCacheState, X_CACHE,
    response_cache,
};
pub use service::{CacheService, CacheServiceBuilder};
pub use settings::{CacheSettings, PathTtl};
pub use store::{BackingStore, MemoryStore, RedisStore, RedisStoreConfig};
pub use wrappers::{Invalidate, Memoize, RequestScope};
