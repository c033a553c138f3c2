//! Bulk export.
//!
//! Preconditions run before the start request. The version must support
//! bulk export and the requested format, and servers inside the known crash
//! window additionally get a spacing guard between exports and a refusal to
//! export empty results. The poller then follows the job's status text
//! until it completes or fails.

use std::time::Duration;

use fleetq_core::{ExportFormat, ExportId, ObjectRef, ServerVersion};
use fleetq_transport::{ExportRequest, Transport};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::cancel::CancelToken;
use crate::error::{ControlError, Result};
use crate::gate::{
    bulk_export_requirement, export_crash_fixed_requirement, export_format_requirement,
    unsupported, VersionGate,
};
use crate::lifecycle::{is_export_terminal, validate_export_transition};
use crate::types::{ExportPollConfig, ExportState};

/// Minimum spacing between exports on servers in the crash window.
pub const EXPORT_SPACING: Duration = Duration::from_secs(1);

/// Status text reported by a finished export.
const COMPLETED_STATUS: &str = "Completed.";

/// What an export status text means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Still producing.
    Running,
    /// Payload ready.
    Completed,
    /// The job failed.
    Failed,
}

/// Classify a status text reported by the server.
#[must_use]
pub fn classify_status(status: &str) -> StatusKind {
    let status = status.trim();
    if status == COMPLETED_STATUS {
        return StatusKind::Completed;
    }
    let lowered = status.to_ascii_lowercase();
    if lowered.contains("fail") || lowered.contains("error") {
        StatusKind::Failed
    } else {
        StatusKind::Running
    }
}

/// Remembers when the last export started.
#[derive(Debug, Default)]
pub struct ExportGuard {
    last_start: Mutex<Option<Instant>>,
}

impl ExportGuard {
    /// Create a guard with no previous export.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail if the previous export was less than [`EXPORT_SPACING`] ago,
    /// otherwise record `now` as the latest export.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::ServerSideExport` when exports are too close.
    pub fn check_and_mark(&self, now: Instant) -> Result<()> {
        let mut last = self.last_start.lock();
        if let Some(previous) = *last {
            let since = now.saturating_duration_since(previous);
            if since < EXPORT_SPACING {
                return Err(ControlError::ServerSideExport {
                    message: format!(
                        "export requested {}ms after the previous one; this server version \
                         needs at least {}s between exports",
                        since.as_millis(),
                        EXPORT_SPACING.as_secs()
                    ),
                    last_status: None,
                });
            }
        }
        *last = Some(now);
        Ok(())
    }
}

/// Check every precondition for exporting `question` in `format`.
///
/// Returns the server version the checks ran against.
pub(crate) async fn check_preconditions<T: Transport + ?Sized>(
    transport: &T,
    gate: &VersionGate,
    guard: &ExportGuard,
    question: &ObjectRef,
    format: ExportFormat,
) -> Result<ServerVersion> {
    let version = gate
        .require(transport, "bulk export", &bulk_export_requirement())
        .await?;

    if let Some(requirement) = export_format_requirement(format) {
        if !requirement.is_satisfied_by(&version) {
            return Err(unsupported(
                &format!("export format {}", format.as_str()),
                Some(&version),
                &requirement,
            ));
        }
    }

    if !export_crash_fixed_requirement().is_satisfied_by(&version) {
        guard.check_and_mark(Instant::now())?;

        let info = transport.fetch_result_info(question).await?;
        if info.row_count == 0 {
            tracing::error!(
                question = %question,
                version = %version,
                "Refusing to export an empty result on a crash-prone server"
            );
            return Err(ControlError::ServerSideExport {
                message: format!(
                    "{question} has no rows yet; exporting an empty result crashes server \
                     version {version}"
                ),
                last_status: None,
            });
        }
    }

    Ok(version)
}

/// A finished export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// Job token.
    pub export_id: ExportId,
    /// Last status text seen.
    pub last_status: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// Starts one export job and follows it to completion.
pub struct ExportPoller<'a, T: Transport + ?Sized> {
    transport: &'a T,
    request: ExportRequest,
    config: ExportPollConfig,
    state: ExportState,
    last_status: Option<String>,
}

impl<'a, T: Transport + ?Sized> ExportPoller<'a, T> {
    /// Create a poller in the `NotStarted` state.
    pub fn new(transport: &'a T, request: ExportRequest, config: ExportPollConfig) -> Self {
        Self {
            transport,
            request,
            config,
            state: ExportState::NotStarted,
            last_status: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ExportState {
        self.state
    }

    fn transition(&mut self, to: ExportState) -> Result<()> {
        self.state = validate_export_transition(self.state, to)?;
        Ok(())
    }

    /// Start the job, wait for it, and download the payload.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::ServerSideExport` if the job reports failure
    /// or times out, `ControlError::Cancelled` if the token fires, or the
    /// collaborator's error.
    pub async fn run(mut self, cancel: &CancelToken) -> Result<ExportOutcome> {
        let result = self.drive(cancel).await;
        if result.is_err() && !is_export_terminal(self.state) {
            self.transition(ExportState::Failed)?;
        }
        result
    }

    async fn drive(&mut self, cancel: &CancelToken) -> Result<ExportOutcome> {
        let started = Instant::now();
        let export_id = self.transport.start_bulk_export(&self.request).await?;
        self.transition(ExportState::Running)?;
        tracing::info!(
            export_id = %export_id,
            question = %self.request.question,
            format = self.request.format.as_str(),
            "Bulk export started"
        );

        let activity = format!("waiting for export {export_id}");
        loop {
            let status = self.transport.bulk_export_status(&export_id).await?;
            tracing::debug!(export_id = %export_id, status = %status, "Export status");
            self.last_status = Some(status.clone());

            match classify_status(&status) {
                StatusKind::Completed => {
                    self.transition(ExportState::Completed)?;
                    break;
                }
                StatusKind::Failed => {
                    return Err(ControlError::ServerSideExport {
                        message: format!("export {export_id} failed"),
                        last_status: self.last_status.clone(),
                    });
                }
                StatusKind::Running => {}
            }

            let elapsed = started.elapsed();
            let timeout = self.config.timeout();
            if elapsed >= timeout {
                return Err(ControlError::ServerSideExport {
                    message: format!(
                        "export {export_id} did not complete within {}s",
                        self.config.timeout_seconds
                    ),
                    last_status: self.last_status.clone(),
                });
            }
            cancel
                .sleep(self.config.interval().min(timeout - elapsed), &activity)
                .await?;
        }

        let payload = self.transport.bulk_export_payload(&export_id).await?;
        tracing::info!(export_id = %export_id, bytes = payload.len(), "Bulk export downloaded");
        Ok(ExportOutcome {
            export_id,
            last_status: self.last_status.clone().unwrap_or_default(),
            payload,
        })
    }
}
