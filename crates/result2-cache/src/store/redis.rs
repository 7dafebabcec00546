//! Redis backing store over a deadpool connection pool.

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;

use super::BackingStore;
use crate::error::{StoreError, StoreResult};

/// Keys requested per SCAN round trip.
const SCAN_BATCH: usize = 500;

/// Connection settings for [`RedisStore`].
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub url: String,
    pub pool_size: usize,
    /// Applied to pool wait/create/recycle and to every command.
    pub timeout: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            timeout: Duration::from_millis(5000),
        }
    }
}

/// Backing store talking to a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    command_timeout: Duration,
}

impl RedisStore {
    /// Build a pool from `config`. Does not connect; use [`ping`](Self::ping)
    /// to verify reachability.
    pub fn connect(config: &RedisStoreConfig) -> StoreResult<Self> {
        let mut redis_config = deadpool_redis::Config::from_url(&config.url);
        let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(config.timeout);
        pool_config.timeouts.create = Some(config.timeout);
        pool_config.timeouts.recycle = Some(config.timeout);
        redis_config.pool = Some(pool_config);

        let pool = redis_config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| StoreError::connection(format!("failed to create Redis pool: {e}")))?;

        Ok(Self::from_pool(pool, config.timeout))
    }

    pub fn from_pool(pool: Pool, command_timeout: Duration) -> Self {
        Self {
            pool,
            command_timeout,
        }
    }

    /// Round-trip a PING to check that the server is reachable.
    pub async fn ping(&self) -> StoreResult<()> {
        self.run(|mut conn| async move {
            let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    /// Check out a connection and run `op` under the command timeout.
    async fn run<T, F, Fut>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(Connection) -> Fut + Send,
        Fut: Future<Output = redis::RedisResult<T>> + Send,
    {
        let work = async {
            let conn = self.pool.get().await?;
            op(conn).await.map_err(StoreError::from)
        };
        match tokio::time::timeout(self.command_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.command_timeout)),
        }
    }
}

#[async_trait]
impl BackingStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.run(|mut conn| async move { conn.get::<_, Option<Vec<u8>>>(key).await })
            .await
    }

    async fn set_with_expiry(&self, key: &str, ttl_secs: u64, value: &[u8]) -> StoreResult<()> {
        self.run(|mut conn| async move { conn.set_ex::<_, _, ()>(key, value, ttl_secs).await })
            .await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.run(|mut conn| async move { conn.del::<_, ()>(keys).await })
            .await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.run(|mut conn| async move { conn.exists::<_, bool>(key).await })
            .await
    }

    async fn increment_by(&self, key: &str, amount: i64) -> StoreResult<i64> {
        self.run(|mut conn| async move { conn.incr::<_, _, i64>(key, amount).await })
            .await
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        self.run(|mut conn| async move { conn.ttl::<_, i64>(key).await })
            .await
    }

    async fn scan_keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.run(|mut conn| async move {
            let mut keys = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn)
                    .await?;
                keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            // SCAN may return a key more than once.
            keys.sort_unstable();
            keys.dedup();
            Ok(keys)
        })
        .await
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
