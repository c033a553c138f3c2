//! Poller state machines.
//!
//! This module defines the valid state transitions for the interactive
//! completion poller and the bulk export poller, and provides validation
//! logic so both pollers only move along legal edges.
//!
//! # Interactive poller
//!
//! ```text
//!     ┌─────────┐   first tick   ┌─────────┐
//!     │ Pending │───────────────▶│ Polling │◀──┐ (below threshold,
//!     └────┬────┘                └────┬────┘───┘  time left)
//!          │                          │
//!          │ (cancel)      ┌──────────┼───────────┐
//!          │               ▼          ▼           ▼
//!          │        ┌───────────┐ ┌──────────┐ ┌───────────┐
//!          └───────▶│ Cancelled │ │ TimedOut │ │ Succeeded │
//!                   └───────────┘ └──────────┘ └───────────┘
//! ```
//!
//! # Bulk export
//!
//! ```text
//!     ┌────────────┐ start  ┌─────────┐ "Completed." ┌───────────┐
//!     │ NotStarted │───────▶│ Running │─────────────▶│ Completed │
//!     └─────┬──────┘        └────┬────┘              └───────────┘
//!           │ (start refused)    │ (failure text, timeout, cancel)
//!           │                    ▼
//!           │              ┌──────────┐
//!           └─────────────▶│  Failed  │
//!                          └──────────┘
//! ```

use crate::error::{ControlError, Result};
use crate::types::{ExportState, PollState};

/// Validates a poller transition and returns the target state if valid.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the transition is not allowed.
pub fn validate_poll_transition(from: PollState, to: PollState) -> Result<PollState> {
    if is_valid_poll_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::InvalidTransition {
            machine: "poller",
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Check if a poller transition is valid.
#[must_use]
pub const fn is_valid_poll_transition(from: PollState, to: PollState) -> bool {
    use PollState::{Cancelled, Pending, Polling, Succeeded, TimedOut};

    matches!(
        (from, to),
        (Pending, Polling | Cancelled) | (Polling, Polling | Succeeded | TimedOut | Cancelled)
    )
}

/// Validates an export transition and returns the target state if valid.
///
/// # Errors
///
/// Returns `ControlError::InvalidTransition` if the transition is not allowed.
pub fn validate_export_transition(from: ExportState, to: ExportState) -> Result<ExportState> {
    if is_valid_export_transition(from, to) {
        Ok(to)
    } else {
        Err(ControlError::InvalidTransition {
            machine: "export",
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// Check if an export transition is valid.
#[must_use]
pub const fn is_valid_export_transition(from: ExportState, to: ExportState) -> bool {
    use ExportState::{Completed, Failed, NotStarted, Running};

    matches!(
        (from, to),
        (NotStarted, Running | Failed) | (Running, Completed | Failed)
    )
}

/// Returns true if the poller has finished.
#[must_use]
pub const fn is_poll_terminal(state: PollState) -> bool {
    matches!(
        state,
        PollState::Succeeded | PollState::TimedOut | PollState::Cancelled
    )
}

/// Returns true if the export job has finished.
#[must_use]
pub const fn is_export_terminal(state: ExportState) -> bool {
    matches!(state, ExportState::Completed | ExportState::Failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_valid_transitions() {
        use PollState::*;

        assert!(is_valid_poll_transition(Pending, Polling));
        assert!(is_valid_poll_transition(Polling, Polling));
        assert!(is_valid_poll_transition(Polling, Succeeded));
        assert!(is_valid_poll_transition(Polling, TimedOut));
        assert!(is_valid_poll_transition(Pending, Cancelled));
    }

    #[test]
    fn poll_invalid_transitions() {
        use PollState::*;

        // A poller must tick before it can judge completion
        assert!(!is_valid_poll_transition(Pending, Succeeded));
        assert!(!is_valid_poll_transition(Pending, TimedOut));
        // Terminal states are final
        assert!(!is_valid_poll_transition(Succeeded, Polling));
        assert!(!is_valid_poll_transition(TimedOut, Succeeded));
    }

    #[test]
    fn export_transitions() {
        use ExportState::*;

        assert!(is_valid_export_transition(NotStarted, Running));
        assert!(is_valid_export_transition(Running, Completed));
        assert!(is_valid_export_transition(Running, Failed));
        assert!(!is_valid_export_transition(NotStarted, Completed));
        assert!(!is_valid_export_transition(Completed, Running));
    }

    #[test]
    fn validate_reports_machine() {
        match validate_export_transition(ExportState::Completed, ExportState::Running) {
            Err(ControlError::InvalidTransition { machine, from, to }) => {
                assert_eq!(machine, "export");
                assert_eq!(from, "completed");
                assert_eq!(to, "running");
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert_eq!(
            validate_poll_transition(PollState::Pending, PollState::Polling).unwrap(),
            PollState::Polling
        );
    }

    #[test]
    fn terminal_states() {
        assert!(is_poll_terminal(PollState::Succeeded));
        assert!(is_poll_terminal(PollState::Cancelled));
        assert!(!is_poll_terminal(PollState::Polling));
        assert!(is_export_terminal(ExportState::Failed));
        assert!(!is_export_terminal(ExportState::Running));
    }
}
