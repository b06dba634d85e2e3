//! Network-specific error handling
//!
//! Type aliases and constructors shared by the wire decoders.

use crate::error::{ViewerError, ViewerResult};

/// Type alias for network-specific results
pub type NetworkResult<T> = ViewerResult<T>;

/// Create a protocol error
pub fn protocol_error(message: impl Into<String>) -> ViewerError {
    ViewerError::ProtocolError {
        message: message.into(),
    }
}

/// Create a truncated buffer error
pub fn truncated(offset: usize, needed: usize, available: usize) -> ViewerError {
    ViewerError::TruncatedBuffer {
        offset,
        needed,
        available,
    }
}

/// Create a malformed welcome error
pub fn malformed_welcome(reason: impl Into<String>) -> ViewerError {
    ViewerError::MalformedWelcome {
        reason: reason.into(),
    }
}
