//! Cache metrics, recorded through the `metrics` facade.
//!
//! Nothing is exported from here; the hosting binary installs a recorder
//! (Prometheus in `result2-server`). Without one these calls are no-ops.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";
    pub const CACHE_SKIPPED_TOTAL: &str = "cache_skipped_total";
    pub const CIRCUIT_OPENED_TOTAL: &str = "cache_circuit_opened_total";
    pub const CIRCUIT_OPEN: &str = "cache_circuit_open";
}

/// Record a cache hit. `layer` is `"service"`, `"response"` or `"memoize"`.
pub fn record_cache_hit(layer: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "layer" => layer).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss(layer: &'static str) {
    counter!(names::CACHE_MISSES_TOTAL, "layer" => layer).increment(1);
}

/// Record a failed backing-store operation.
pub fn record_cache_error(op: &'static str) {
    counter!(names::CACHE_ERRORS_TOTAL, "op" => op).increment(1);
}

/// Record an operation refused by the open circuit.
pub fn record_cache_skipped(op: &'static str) {
    counter!(names::CACHE_SKIPPED_TOTAL, "op" => op).increment(1);
}

pub fn record_circuit_opened() {
    counter!(names::CIRCUIT_OPENED_TOTAL).increment(1);
}

pub fn set_circuit_open(open: bool) {
    gauge!(names::CIRCUIT_OPEN).set(if open { 1.0 } else { 0.0 });
}
