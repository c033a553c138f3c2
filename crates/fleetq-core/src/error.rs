//! Common error types for fleetq.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

use crate::objects::ObjectKind;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors raised while handling identifiers, versions, and object payloads.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// A server version string could not be parsed.
    #[error("invalid server version {raw:?}: {reason}")]
    InvalidVersion {
        /// The raw version string as reported.
        raw: String,
        /// Why parsing failed.
        reason: String,
    },

    /// An object payload did not match the typed model for its kind.
    #[error("malformed {kind} payload: {source}")]
    MalformedObject {
        /// The object kind that was being decoded.
        kind: ObjectKind,
        /// The underlying decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// An object kind name was not recognised.
    #[error("unknown object kind: {0:?}")]
    UnknownKind(String),

    /// An export format name was not recognised.
    #[error("unknown export format: {0:?}")]
    UnknownFormat(String),
}
