//! Crate-wide error taxonomy
//!
//! Every failure the viewer can hit while decoding server traffic, talking to
//! the asset cache or encoding input ends up as a [`ViewerError`]. None of them
//! are retried: the session driver resets to the welcome state and the
//! transport is expected to reconnect.

use crate::persistence::PersistenceError;

/// Result type for viewer operations
pub type ViewerResult<T> = Result<T, ViewerError>;

/// Errors raised by the viewer pipeline
#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("Truncated buffer: needed {needed} bytes at offset {offset}, only {available} available")]
    TruncatedBuffer {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Malformed welcome message: {reason}")]
    MalformedWelcome { reason: String },

    #[error("Asset cache failure: {0}")]
    CacheIo(#[from] PersistenceError),

    #[error("Outbound buffer overflow: record of {requested} bytes, {remaining} of {capacity} left")]
    OutboundOverflow {
        requested: usize,
        remaining: usize,
        capacity: usize,
    },

    #[error("Protocol error: {message}")]
    ProtocolError { message: String },

    #[error("Invalid state: expected {expected}, was {actual}")]
    StateError { expected: String, actual: String },

    #[error("Invalid configuration for {field} = {value}: {reason}")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Channel closed: {name}")]
    ChannelClosed { name: String },
}

impl ViewerError {
    /// Whether the error came from a bad or short server payload
    pub fn is_protocol_failure(&self) -> bool {
        matches!(
            self,
            ViewerError::TruncatedBuffer { .. }
                | ViewerError::MalformedWelcome { .. }
                | ViewerError::ProtocolError { .. }
        )
    }
}

/// Attach a context string to foreign errors
pub trait ErrorContext<T> {
    fn context(self, context: &str) -> ViewerResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, context: &str) -> ViewerResult<T> {
        self.map_err(|e| ViewerError::ProtocolError {
            message: format!("{}: {}", context, e),
        })
    }
}
