//! Circuit breaker gating calls to the backing store.
//!
//! Two states only. Recovery is evaluated lazily: the first access after
//! `recovery_timeout` has elapsed since the last failure closes the breaker
//! again and lets that call through as a probe.
//!
//! ```text
//!            failure_count >= threshold
//!   CLOSED ───────────────────────────────► OPEN
//!     ▲                                       │
//!     └──── access after recovery_timeout ────┘
//! ```
//!
//! Time comes from [`tokio::time::Instant`], so tests can pause and advance
//! the clock.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

use crate::metrics;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitState {
    Closed,
    Open,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
        }
    }
}

/// Point-in-time view of the breaker, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    /// Seconds since the last recorded failure, if any.
    pub last_failure_secs_ago: Option<u64>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Process-local circuit breaker, shared by handle with the cache service.
#[derive(Debug)]
pub struct CircuitBreaker {
    cfg: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(cfg: CircuitBreakerConfig) -> Self {
        Self {
            cfg,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    /// Ask permission for one backing-store call.
    ///
    /// Returns `false` while open and inside the recovery window. Once the
    /// window has passed the breaker closes, the failure count resets, and
    /// the call is allowed through.
    pub fn try_acquire(&self) -> bool {
        let mut st = self.inner.lock();
        if st.state == CircuitState::Closed {
            return true;
        }

        let elapsed = st
            .last_failure
            .map(|t| t.elapsed())
            .unwrap_or(Duration::MAX);
        if elapsed > self.cfg.recovery_timeout {
            tracing::info!(
                elapsed_secs = elapsed.as_secs_f64(),
                "Attempting circuit recovery"
            );
            st.state = CircuitState::Closed;
            st.failure_count = 0;
            metrics::set_circuit_open(false);
            return true;
        }
        false
    }

    /// Read-only variant of [`try_acquire`](Self::try_acquire): would a call
    /// be permitted right now?
    pub fn is_available(&self) -> bool {
        let st = self.inner.lock();
        match st.state {
            CircuitState::Closed => true,
            CircuitState::Open => st
                .last_failure
                .is_none_or(|t| t.elapsed() > self.cfg.recovery_timeout),
        }
    }

    pub fn record_success(&self) {
        let mut st = self.inner.lock();
        if st.state == CircuitState::Closed && st.failure_count > 0 {
            tracing::info!(
                previous_failures = st.failure_count,
                "Backing store call succeeded, reset failure count"
            );
            st.failure_count = 0;
        }
    }

    pub fn record_failure(&self) {
        let mut st = self.inner.lock();
        st.failure_count = st.failure_count.saturating_add(1);
        st.last_failure = Some(Instant::now());

        if st.state == CircuitState::Closed && st.failure_count >= self.cfg.failure_threshold {
            st.state = CircuitState::Open;
            tracing::warn!(
                failures = st.failure_count,
                recovery_timeout_secs = self.cfg.recovery_timeout.as_secs(),
                "Circuit breaker opened after consecutive backing store failures"
            );
            metrics::record_circuit_opened();
            metrics::set_circuit_open(true);
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let st = self.inner.lock();
        BreakerSnapshot {
            state: st.state,
            failure_count: st.failure_count,
            failure_threshold: self.cfg.failure_threshold,
            recovery_timeout_secs: self.cfg.recovery_timeout.as_secs(),
            last_failure_secs_ago: st.last_failure.map(|t| t.elapsed().as_secs()),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, recovery_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::new()
                .with_failure_threshold(threshold)
                .with_recovery_timeout(Duration::from_secs(recovery_secs)),
        )
    }

    #[test]
    fn config_defaults() {
        let cfg = CircuitBreakerConfig::default();
        assert_eq!(cfg.failure_threshold, 5);
        assert_eq!(cfg.recovery_timeout, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn starts_closed() {
        let cb = CircuitBreaker::default();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.try_acquire());
        assert!(cb.is_available());
        assert_eq!(cb.snapshot().failure_count, 0);
        assert!(cb.snapshot().last_failure_secs_ago.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn opens_at_threshold() {
        let cb = breaker(3, 60);
        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());
        assert!(cb.try_acquire());

        cb.record_failure();
        assert!(cb.is_open());
        assert!(!cb.try_acquire());
        assert!(!cb.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failures_while_closed() {
        let cb = breaker(3, 60);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);

        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn stays_open_inside_recovery_window() {
        let cb = breaker(1, 60);
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(60)).await;
        // elapsed must be strictly greater than the timeout
        assert!(!cb.try_acquire());
        assert!(cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_timeout() {
        let cb = breaker(2, 30);
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_open());

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cb.is_available());
        assert!(cb.is_open(), "peeking must not change state");

        assert!(cb.try_acquire());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_while_open_extend_the_window() {
        let cb = breaker(1, 30);
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(20)).await;
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(!cb.try_acquire());
        assert_eq!(cb.failure_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reports_state() {
        let cb = breaker(1, 45);
        cb.record_failure();
        tokio::time::advance(Duration::from_secs(5)).await;
        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Open);
        assert_eq!(snap.failure_count, 1);
        assert_eq!(snap.failure_threshold, 1);
        assert_eq!(snap.recovery_timeout_secs, 45);
        assert_eq!(snap.last_failure_secs_ago, Some(5));
    }
}
