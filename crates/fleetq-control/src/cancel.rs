//! Cooperative cancellation for polling loops.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{ControlError, Result};

/// A clonable cancellation signal.
///
/// All clones observe the same signal. Every suspension point in the
/// orchestrator sleeps through [`CancelToken::sleep`], so a cancel wakes the
/// loop immediately instead of after the current interval.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
}

impl CancelToken {
    /// Create a token that has not been cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation to every clone.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Whether cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Resolve once cancellation is signalled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }

    /// Fail with `Cancelled` if cancellation has been signalled.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Cancelled` naming the activity.
    pub fn check(&self, activity: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(ControlError::Cancelled(activity.to_string()))
        } else {
            Ok(())
        }
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Cancelled` if cancelled before the sleep ends.
    pub async fn sleep(&self, duration: Duration, activity: &str) -> Result<()> {
        tokio::select! {
            () = tokio::time::sleep(duration) => Ok(()),
            () = self.cancelled() => Err(ControlError::Cancelled(activity.to_string())),
        }
    }
}
