//! Error types for pool operations
use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type covering every failure mode of the pool.
#[derive(Error, Debug)]
pub enum Error {
    /// Pool configuration is invalid
    #[error("configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// An acquire was not served within the configured deadline
    #[error("acquire timed out after {timeout_ms}ms ({pending} waiters queued)")]
    AcquireTimeout {
        /// The acquire timeout in milliseconds
        timeout_ms: u64,
        /// Number of waiters queued when the timeout fired
        pending: usize,
    },

    /// An out-of-band creation request would exceed the pool's maximum size
    #[error("pool exhausted: {total}/{max} resources live")]
    PoolExhausted {
        /// Current number of live resources
        total: usize,
        /// Maximum pool size
        max: usize,
    },

    /// Every borrow candidate failed validation within the retry bound
    #[error("resource validation failed after {attempts} attempts")]
    ValidationFailed {
        /// Number of candidates tried before giving up
        attempts: usize,
    },

    /// A factory operation failed
    #[error("factory {operation} failed: {reason}")]
    Factory {
        /// The factory operation that failed ("create", "begin", ...)
        operation: &'static str,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The pool is draining and no longer accepts acquisitions
    #[error("pool is draining, no new acquisitions accepted")]
    Draining,

    /// Outstanding borrows did not return within the drain deadline
    #[error("drain timed out after {timeout_ms}ms with {outstanding} resources still borrowed")]
    DrainTimeout {
        /// The drain timeout in milliseconds
        timeout_ms: u64,
        /// Number of resources still borrowed when the deadline expired
        outstanding: usize,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a factory error without an underlying source
    pub fn factory<S: Into<String>>(operation: &'static str, reason: S) -> Self {
        Self::Factory {
            operation,
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a factory error wrapping an underlying source error
    pub fn factory_source<E>(operation: &'static str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Factory {
            operation,
            reason: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AcquireTimeout { .. } | Self::PoolExhausted { .. } | Self::DrainTimeout { .. }
        )
    }
}
