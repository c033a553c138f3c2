//! Interactive completion poller.
//!
//! Ticks against a question's progress snapshot until the reported
//! fraction reaches the threshold or the timeout elapses. A timeout is a
//! reportable outcome, not an error; only cancellation and collaborator
//! failures abort the poll.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fleetq_core::{ObjectId, ObjectKind, ObjectRef, ResultInfo};
use fleetq_transport::Transport;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

use crate::cancel::CancelToken;
use crate::error::Result;
use crate::lifecycle::validate_poll_transition;
use crate::types::{PollConfig, PollState, PollerReport};

/// Per-identity async locks.
///
/// Polls against the same question and refreshes of the same saved
/// question are serialized within one orchestrator.
#[derive(Debug, Default)]
pub struct IdentityLocks {
    locks: parking_lot::Mutex<HashMap<(ObjectKind, ObjectId), Arc<tokio::sync::Mutex<()>>>>,
}

impl IdentityLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to an identity.
    pub async fn acquire(&self, kind: ObjectKind, id: ObjectId) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.lock().entry((kind, id)).or_default());
        lock.lock_owned().await
    }
}

/// Polls one object's progress until it is sufficiently complete.
pub struct InteractivePoller<'a, T: Transport + ?Sized> {
    transport: &'a T,
    target: ObjectRef,
    config: PollConfig,
    state: PollState,
    ticks: u32,
    last_info: Option<ResultInfo>,
}

impl<'a, T: Transport + ?Sized> InteractivePoller<'a, T> {
    /// Create a poller in the `Pending` state.
    pub fn new(transport: &'a T, target: ObjectRef, config: PollConfig) -> Self {
        Self {
            transport,
            target,
            config,
            state: PollState::Pending,
            ticks: 0,
            last_info: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> PollState {
        self.state
    }

    fn transition(&mut self, to: PollState) -> Result<()> {
        self.state = validate_poll_transition(self.state, to)?;
        Ok(())
    }

    /// Tick until a terminal state is reached.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Cancelled` if the token fires, or the
    /// collaborator's error if a progress fetch fails.
    pub async fn run(mut self, cancel: &CancelToken) -> Result<PollerReport> {
        let started = Instant::now();
        let activity = format!("polling {}", self.target);

        if let Err(e) = cancel.check(&activity) {
            self.transition(PollState::Cancelled)?;
            return Err(e);
        }
        self.transition(PollState::Polling)?;

        loop {
            self.ticks += 1;
            let info = self.transport.fetch_result_info(&self.target).await?;
            let fraction = info.completion_fraction();
            tracing::debug!(
                target_object = %self.target,
                tick = self.ticks,
                row_count = info.row_count,
                estimated_total = info.estimated_total,
                fraction = ?fraction,
                "Poll tick"
            );
            self.last_info = Some(info);

            if fraction.is_some_and(|f| f >= self.config.threshold) {
                self.transition(PollState::Succeeded)?;
                tracing::info!(
                    target_object = %self.target,
                    ticks = self.ticks,
                    threshold = self.config.threshold,
                    "Completion threshold reached"
                );
                break;
            }

            let elapsed = started.elapsed();
            let timeout = self.config.timeout();
            if elapsed >= timeout {
                self.transition(PollState::TimedOut)?;
                tracing::warn!(
                    target_object = %self.target,
                    ticks = self.ticks,
                    timeout_seconds = self.config.timeout_seconds,
                    fraction = ?fraction,
                    "Poller timed out before reaching the threshold"
                );
                break;
            }

            let wait = self.config.interval().min(timeout - elapsed);
            if let Err(e) = cancel.sleep(wait, &activity).await {
                self.transition(PollState::Cancelled)?;
                return Err(e);
            }
            self.transition(PollState::Polling)?;
        }

        Ok(self.into_report(started.elapsed()))
    }

    fn into_report(self, elapsed: Duration) -> PollerReport {
        PollerReport {
            target: self.target,
            state: self.state,
            threshold: self.config.threshold,
            ticks: self.ticks,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            last_info: self.last_info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ControlError;
    use crate::types::PollOutcome;
    use fleetq_transport::MockTransport;

    fn snapshot(row_count: u64, estimated_total: i64) -> ResultInfo {
        ResultInfo {
            question_id: Some(ObjectId::new(5)),
            estimated_total,
            row_count,
            ..ResultInfo::default()
        }
    }

    fn question() -> ObjectRef {
        ObjectRef::by_id(ObjectKind::Question, ObjectId::new(5))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_the_complete_tick() {
        let mock = MockTransport::new();
        mock.script_result_info(
            ObjectKind::Question,
            ObjectId::new(5),
            [snapshot(5, 10), snapshot(9, 10), snapshot(10, 10)],
        );

        let report = InteractivePoller::new(&mock, question(), PollConfig::default())
            .run(&CancelToken::new())
            .await
            .unwrap();

        assert_eq!(report.state, PollState::Succeeded);
        assert_eq!(report.outcome(), Some(PollOutcome::Succeeded));
        assert_eq!(report.ticks, 3);
        assert_eq!(report.elapsed_ms, 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_threshold_never_reached() {
        let mock = MockTransport::new();
        mock.script_result_info(
            ObjectKind::Question,
            ObjectId::new(5),
            [snapshot(2, 10), snapshot(8, 10)],
        );
        let config = PollConfig {
            timeout_seconds: 30,
            ..PollConfig::default()
        };

        let report = InteractivePoller::new(&mock, question(), config)
            .run(&CancelToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome(), Some(PollOutcome::TimedOut));
        assert_eq!(report.ticks, 7);
        assert_eq!(report.last_fraction(), Some(0.8));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_estimate_is_not_success() {
        let mock = MockTransport::new();
        mock.script_result_info(ObjectKind::Question, ObjectId::new(5), [snapshot(0, 0)]);
        let config = PollConfig {
            timeout_seconds: 10,
            ..PollConfig::default()
        };

        let report = InteractivePoller::new(&mock, question(), config)
            .run(&CancelToken::new())
            .await
            .unwrap();
        assert_eq!(report.state, PollState::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_loop() {
        let mock = MockTransport::new();
        mock.script_result_info(ObjectKind::Question, ObjectId::new(5), [snapshot(1, 10)]);
        let token = CancelToken::new();
        token.cancel();

        let err = InteractivePoller::new(&mock, question(), PollConfig::default())
            .run(&token)
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Cancelled(_)));
    }

    #[tokio::test]
    async fn missing_snapshot_propagates() {
        let mock = MockTransport::new();
        let err = InteractivePoller::new(&mock, question(), PollConfig::default())
            .run(&CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Transport(_)));
    }

    #[tokio::test]
    async fn identity_locks_serialize_same_id() {
        let locks = Arc::new(IdentityLocks::new());
        let guard = locks.acquire(ObjectKind::Question, ObjectId::new(1)).await;

        let other = locks.acquire(ObjectKind::Question, ObjectId::new(2)).await;
        drop(other);

        let contender = Arc::clone(&locks);
        let handle = tokio::spawn(async move {
            let _guard = contender.acquire(ObjectKind::Question, ObjectId::new(1)).await;
        });
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());
        drop(guard);
        handle.await.unwrap();
    }
}
