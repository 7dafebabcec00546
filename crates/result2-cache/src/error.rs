//! Error types for the cache subsystem.
//!
//! None of these ever reach a request handler: [`CacheService`](crate::CacheService)
//! converts them into its "unavailable" results after feeding the circuit breaker.

use std::time::Duration;

/// Errors raised by a [`BackingStore`](crate::BackingStore) implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Could not obtain a connection to the backing store.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backing store rejected or failed a command.
    #[error("Command error: {0}")]
    Command(String),

    /// The command did not complete within the configured timeout.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// The stored value has the wrong shape for the command (e.g. INCRBY on text).
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl StoreError {
    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Creates a new `Command` error.
    #[must_use]
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command(message.into())
    }

    /// Returns `true` if the error means the store itself is unreachable,
    /// as opposed to a problem with one particular value.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout()
            || e.is_connection_refusal()
            || e.is_connection_dropped()
            || e.is_io_error()
        {
            return Self::Connection(e.to_string());
        }
        Self::Command(e.to_string())
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::Connection(e.to_string())
    }
}

/// Errors raised while encoding a value for storage.
///
/// Decoding has no error type: it always falls back to the raw payload.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Neither the binary nor the text format could represent the value.
    #[error("value is not serializable (binary: {binary}, text: {text})")]
    Unserializable { binary: String, text: String },
}

/// Type alias for a backing-store result.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_and_timeout_count_as_unavailable() {
        assert!(StoreError::connection("refused").is_unavailable());
        assert!(StoreError::Timeout(Duration::from_millis(50)).is_unavailable());
        assert!(!StoreError::command("WRONGTYPE").is_unavailable());
        assert!(!StoreError::InvalidValue("abc".into()).is_unavailable());
    }

    #[test]
    fn display_includes_message() {
        let err = StoreError::command("ERR unknown command");
        assert_eq!(err.to_string(), "Command error: ERR unknown command");
    }
}
