//! Error types for the orchestration layer.
//!
//! Every failure the core can raise maps to one variant here. Collaborator
//! failures are wrapped unchanged so callers can still inspect them.

use fleetq_core::{CoreError, ObjectId};
use fleetq_transport::TransportError;
use thiserror::Error;

/// A result type using `ControlError`.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors that can occur in orchestration operations.
#[derive(Debug, Error)]
pub enum ControlError {
    /// Query or search input is malformed or references unknown definitions.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The server version does not support a feature.
    #[error("{feature} not supported by server version {version} (requires {requirement})")]
    UnsupportedVersion {
        /// The gated feature.
        feature: String,
        /// The detected server version, or `unknown`.
        version: String,
        /// The requirement that was not met.
        requirement: String,
    },

    /// A parsed question needs an explicit candidate choice.
    #[error("no valid candidate picked for {text:?}: choose an index between 1 and {candidates}")]
    Picker {
        /// The text that was parsed.
        text: String,
        /// Number of candidates available.
        candidates: usize,
    },

    /// The server parser could not interpret the text.
    #[error("question text {0:?} could not be parsed into a query")]
    ParseJob(String),

    /// A retrieval returned an unacceptable number of objects.
    #[error("cardinality check failed: {report}; returned {} item(s)", items.len())]
    CheckLimit {
        /// Every constraint evaluated and its outcome.
        report: String,
        /// The offending objects.
        items: Vec<String>,
    },

    /// A bulk export precondition was violated or the job failed.
    #[error("server side export failed: {message}")]
    ServerSideExport {
        /// What went wrong.
        message: String,
        /// Last status text reported by the job, if any.
        last_status: Option<String>,
    },

    /// The saved question refresh did not produce a new run in time.
    #[error(
        "refresh of {saved_question} gave up after {attempts} attempt(s); last question id {last_question_id:?}"
    )]
    RefreshExhausted {
        /// The saved question being refreshed.
        saved_question: String,
        /// Attempts made.
        attempts: u32,
        /// Last question instance observed.
        last_question_id: Option<ObjectId>,
    },

    /// The operation was cancelled.
    #[error("cancelled while {0}")]
    Cancelled(String),

    /// A requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request is missing required input or cannot be honored.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A poller attempted an illegal state transition.
    #[error("invalid {machine} transition: cannot transition from {from} to {to}")]
    InvalidTransition {
        /// The state machine.
        machine: &'static str,
        /// The current state.
        from: String,
        /// The requested target state.
        to: String,
    },

    /// Transport layer error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Core type error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ControlError {
    /// Returns true if this error might be resolved by retrying.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retriable(),
            Self::RefreshExhausted { .. } => true,
            _ => false,
        }
    }

    /// Process exit code for command line callers.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::InvalidRequest(_) | Self::Picker { .. } => 2,
            Self::UnsupportedVersion { .. } => 3,
            Self::CheckLimit { .. } | Self::NotFound(_) => 4,
            Self::Cancelled(_) => 130,
            _ => 1,
        }
    }
}
