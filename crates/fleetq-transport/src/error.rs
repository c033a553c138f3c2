//! Transport error types.

use thiserror::Error;

/// A result type using `TransportError`.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors raised by the session transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never produced a response (connect, TLS, timeout).
    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Server-supplied error text, or a generic description.
        message: String,
    },

    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The transport does not implement this operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TransportError {
    /// Returns `true` for failures that may succeed when retried.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::NotFound(_) | Self::Decode(_) | Self::Unsupported(_) | Self::Internal(_) => false,
        }
    }

    /// Returns the HTTP status code associated with this error, if any.
    #[must_use]
    pub const fn http_status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::Request(_) | Self::Decode(_) | Self::Unsupported(_) | Self::Internal(_) => None,
        }
    }
}
