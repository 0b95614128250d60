//! Error types for pushstream operations.

use thiserror::Error;

/// Error payload carried on the `error` channel of an observable.
///
/// Errors are plain values to this library: they are emitted, forwarded,
/// replayed and compared, never retried. Retry and fallback policy belongs to
/// callers, composed out of `catch`/`concat`/`if_empty`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Transport-level failure reported by an underlying fetch
    #[error("network error: {0}")]
    Network(String),
    /// Operation timed out
    #[error("operation timed out")]
    Timeout,
    /// Request was cancelled before producing a terminal event
    #[error("request cancelled")]
    Cancelled,
    /// Custom error with message
    #[error("stream error: {0}")]
    Custom(String),
}

impl StreamError {
    /// Shorthand for `StreamError::Custom` from any message-like input.
    pub fn custom(message: impl Into<String>) -> Self {
        StreamError::Custom(message.into())
    }
}

/// Result type for pushstream operations
pub type StreamResult<T> = Result<T, StreamError>;
