pub mod cli;
pub mod config;
pub mod handlers;
pub mod metrics;
pub mod observability;
pub mod server;

use std::sync::Arc;

use result2_cache::{BackingStore, CacheService, CacheSettings, MemoryStore, RedisStore};

pub use config::{AppConfig, ConfigError, LoggingConfig, MetricsConfig, RedisConfig, ServerConfig};
pub use observability::init_tracing;
pub use server::{AppState, Result2Server, ServerBuilder, build_app};

/// Create the backing store for the cache.
///
/// - **Redis disabled**: in-process [`MemoryStore`]
/// - **Redis enabled**: connects and pings Redis, falling back to
///   [`MemoryStore`] if the pool cannot be created or the server is unreachable
pub async fn create_backing_store(config: &RedisConfig) -> Arc<dyn BackingStore> {
    if !config.enabled {
        tracing::info!("Redis disabled, using in-process cache store");
        return Arc::new(MemoryStore::new());
    }

    tracing::info!(url = %config.url, "Connecting to Redis");

    let store = match RedisStore::connect(&config.store_config()) {
        Ok(store) => store,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to in-process cache store."
            );
            return Arc::new(MemoryStore::new());
        }
    };

    match store.ping().await {
        Ok(()) => {
            tracing::info!("Connected to Redis");
            Arc::new(store)
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to connect to Redis. Falling back to in-process cache store."
            );
            Arc::new(MemoryStore::new())
        }
    }
}

/// Backing store plus a [`CacheService`] configured from `cfg`.
pub async fn create_cache_service(cfg: &AppConfig) -> CacheService {
    let store = create_backing_store(&cfg.redis).await;
    cache_service_for(store, &cfg.cache)
}

pub fn cache_service_for(store: Arc<dyn BackingStore>, settings: &CacheSettings) -> CacheService {
    let cache = CacheService::from_settings(store, settings);
    tracing::info!(
        backend = cache.backend_name(),
        default_ttl_secs = settings.default_ttl_secs,
        failure_threshold = settings.failure_threshold,
        recovery_timeout_secs = settings.recovery_timeout_secs,
        "Cache service ready"
    );
    cache
}
