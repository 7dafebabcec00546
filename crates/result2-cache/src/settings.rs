use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::breaker::CircuitBreakerConfig;

/// Cache subsystem configuration, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Mount the response cache middleware
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// TTL used when neither the caller nor the path table supplies one
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Consecutive backing-store failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before a recovery probe
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,

    /// Per-path TTL overrides; the longest matching prefix wins
    #[serde(default = "default_path_ttls")]
    pub path_ttls: Vec<PathTtl>,

    /// Paths never served from or written to the response cache
    #[serde(default = "default_excluded_prefixes")]
    pub excluded_prefixes: Vec<String>,

    /// Memoized results are only stored when the computation took longer
    #[serde(default = "default_memoize_min_cost_ms")]
    pub memoize_min_cost_ms: u64,

    /// Responses larger than this are passed through uncached
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathTtl {
    pub prefix: String,
    pub ttl_secs: u64,
}

impl PathTtl {
    pub fn new(prefix: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            prefix: prefix.into(),
            ttl_secs,
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_ttl_secs() -> u64 {
    300
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_recovery_timeout_secs() -> u64 {
    60
}
fn default_path_ttls() -> Vec<PathTtl> {
    vec![
        PathTtl::new("/dashboard", 60), // dashboard updates frequently
        PathTtl::new("/analytics", 300),
        PathTtl::new("/results", 600),
        PathTtl::new("/student", 600),
        PathTtl::new("/api/", 60),
    ]
}
fn default_excluded_prefixes() -> Vec<String> {
    ["/admin", "/static", "/api/health", "/metrics"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_memoize_min_cost_ms() -> u64 {
    100
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_ttl_secs: default_ttl_secs(),
            failure_threshold: default_failure_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
            path_ttls: default_path_ttls(),
            excluded_prefixes: default_excluded_prefixes(),
            memoize_min_cost_ms: default_memoize_min_cost_ms(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl CacheSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_ttl_secs == 0 {
            return Err("cache.default_ttl_secs must be > 0".into());
        }
        if self.failure_threshold == 0 {
            return Err("cache.failure_threshold must be > 0".into());
        }
        for entry in &self.path_ttls {
            if !entry.prefix.starts_with('/') {
                return Err(format!(
                    "cache.path_ttls prefix {:?} must start with '/'",
                    entry.prefix
                ));
            }
            if entry.ttl_secs == 0 {
                return Err(format!("cache.path_ttls[{}].ttl_secs must be > 0", entry.prefix));
            }
        }
        if let Some(bad) = self.excluded_prefixes.iter().find(|p| !p.starts_with('/')) {
            return Err(format!("cache.excluded_prefixes entry {bad:?} must start with '/'"));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn memoize_min_cost(&self) -> Duration {
        Duration::from_millis(self.memoize_min_cost_ms)
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(self.failure_threshold)
            .with_recovery_timeout(Duration::from_secs(self.recovery_timeout_secs))
    }
}
