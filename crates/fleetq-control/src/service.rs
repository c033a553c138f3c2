//! Orchestrator service.
//!
//! [`Orchestrator`] owns the transport plus the little state that outlives
//! a single call: the cached server version, the export spacing timestamp,
//! and the per-identity poll locks. Question lifecycle operations live in
//! [`crate::question`]; everything else is here.

use std::sync::Arc;

use fleetq_core::{
    Action, ActionStop, ExportFormat, ObjectId, ObjectKind, ObjectRef, Record, ResultData,
    ResultInfo, ResultSet, SavedAction, SavedActionApproval, SearchSpec, VersionRequirement,
};
use fleetq_transport::{ExportRequest, Transport};

use crate::cancel::CancelToken;
use crate::error::{ControlError, Result};
use crate::export::{check_preconditions, ExportGuard, ExportPoller};
use crate::gate::VersionGate;
use crate::poller::{IdentityLocks, InteractivePoller};
use crate::retrieve::{retrieve, Retrieved};
use crate::types::{
    DeleteOptions, ExportOptions, Limits, OrchestratorConfig, PollConfig, PollerReport,
    ResultOptions, RetrieveOptions,
};

/// Drives queries and administrative operations against one server.
pub struct Orchestrator<T: Transport> {
    pub(crate) transport: Arc<T>,
    pub(crate) config: OrchestratorConfig,
    pub(crate) gate: VersionGate,
    pub(crate) export_guard: ExportGuard,
    pub(crate) locks: IdentityLocks,
}

impl<T: Transport> Orchestrator<T> {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(transport: Arc<T>, config: OrchestratorConfig) -> Self {
        Self {
            transport,
            config,
            gate: VersionGate::new(),
            export_guard: ExportGuard::new(),
            locks: IdentityLocks::new(),
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(transport: Arc<T>) -> Self {
        Self::new(transport, OrchestratorConfig::default())
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The configuration defaults.
    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // =========================================================================
    // Version
    // =========================================================================

    /// The server's version string, exactly as reported.
    ///
    /// # Errors
    ///
    /// Propagates the transport failure.
    pub async fn server_version(&self) -> Result<String> {
        Ok(self.transport.server_version().await?)
    }

    /// Whether the server version satisfies `requirement`.
    pub async fn supports(&self, requirement: &VersionRequirement) -> bool {
        self.gate.supports(self.transport.as_ref(), requirement).await
    }

    // =========================================================================
    // Retrieval
    // =========================================================================

    /// Retrieve objects of type `R` matching `search`.
    ///
    /// Sensor searches only match top-level sensors: every group gains a
    /// `source_id = 0` constraint.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::CheckLimit` if the limits are not met, or the
    /// transport failure.
    pub async fn get<R: Record>(
        &self,
        search: &SearchSpec,
        options: &RetrieveOptions,
    ) -> Result<Retrieved<R>> {
        let search = if R::KIND == ObjectKind::Sensor && !search.is_empty() {
            search.clone().with_constraint_on_every_group("source_id", "0")
        } else {
            search.clone()
        };
        retrieve::<R, T>(self.transport.as_ref(), &search, options).await
    }

    /// Retrieve exactly one object of type `R` matching `search`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::CheckLimit` unless exactly one object matches.
    pub async fn get_one<R: Record>(&self, search: &SearchSpec) -> Result<R> {
        let found = self.get::<R>(search, &RetrieveOptions::exactly_one()).await?;
        found.into_single().ok_or_else(|| {
            ControlError::NotFound(format!("no single {} matched the search", R::KIND))
        })
    }

    /// Fetch one object by identity, hidden objects included.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::NotFound` if the object does not exist.
    pub async fn fetch_one<R: Record>(&self, id: ObjectId) -> Result<R> {
        let options = RetrieveOptions {
            limits: Limits::exactly_one(),
            include_hidden: true,
            defects: None,
        };
        let missing = || ControlError::NotFound(format!("{} id={id}", R::KIND));
        match retrieve::<R, T>(self.transport.as_ref(), &SearchSpec::by_id(id), &options).await {
            Ok(found) => found.into_single().ok_or_else(missing),
            Err(ControlError::CheckLimit { items, .. }) if items.is_empty() => Err(missing()),
            Err(ControlError::Transport(e)) if e.http_status_code() == Some(404) => Err(missing()),
            Err(e) => Err(e),
        }
    }

    /// Submit an object and return the server's full view of it.
    ///
    /// # Errors
    ///
    /// Propagates submit and re-fetch failures.
    pub async fn add<R: Record>(&self, object: &R) -> Result<R> {
        let id = self.submit(object).await?;
        self.fetch_one::<R>(id).await
    }

    async fn submit<R: Record>(&self, object: &R) -> Result<ObjectId> {
        let body = serde_json::to_value(object).map_err(|e| {
            ControlError::InvalidRequest(format!("cannot encode {}: {e}", R::KIND))
        })?;
        let id = self.transport.submit(R::KIND, &body).await?;
        tracing::info!(kind = %R::KIND, id = %id, "Submitted object");
        Ok(id)
    }

    // =========================================================================
    // Results
    // =========================================================================

    /// Current progress snapshot of a question or saved question.
    ///
    /// # Errors
    ///
    /// Propagates the transport failure.
    pub async fn result_info(&self, object: &ObjectRef) -> Result<ResultInfo> {
        Ok(self.transport.fetch_result_info(object).await?)
    }

    /// Answer data for a question, read directly or through a bulk export.
    ///
    /// # Errors
    ///
    /// Propagates export and transport failures.
    pub async fn result_data(
        &self,
        object: &ObjectRef,
        options: &ResultOptions,
        cancel: &CancelToken,
    ) -> Result<ResultData> {
        match &options.export {
            Some(export) => self.export_result_data(object, export, cancel).await,
            None => {
                let set = self
                    .transport
                    .fetch_result_data(object, options.aggregate)
                    .await?;
                Ok(ResultData::Set(set))
            }
        }
    }

    /// Answer data through a server-side bulk export.
    ///
    /// The structured format is decoded and overlaid with the latest
    /// progress snapshot; other formats come back as text.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::UnsupportedVersion` if the server cannot
    /// export in this format, `ControlError::ServerSideExport` if a crash
    /// guard trips or the job fails.
    pub async fn export_result_data(
        &self,
        question: &ObjectRef,
        options: &ExportOptions,
        cancel: &CancelToken,
    ) -> Result<ResultData> {
        let transport = self.transport.as_ref();
        check_preconditions(
            transport,
            &self.gate,
            &self.export_guard,
            question,
            options.format,
        )
        .await?;

        let request = ExportRequest {
            question: question.clone(),
            format: options.format,
            leading_text: options.leading_text.clone(),
            trailing_text: options.trailing_text.clone(),
        };
        let config = options.poll.unwrap_or(self.config.export_poll);
        let outcome = ExportPoller::new(transport, request, config)
            .run(cancel)
            .await?;

        let latest = if options.format.is_structured() {
            Some(self.result_info(question).await?)
        } else {
            None
        };
        decode_export(transport, latest.as_ref(), options.format, &outcome.payload)
    }

    /// Poll a question until it is sufficiently complete or times out.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Cancelled` if the token fires, or the
    /// transport failure.
    pub async fn poll_question(
        &self,
        question: &ObjectRef,
        config: Option<PollConfig>,
        cancel: &CancelToken,
    ) -> Result<PollerReport> {
        let id = question.id.ok_or_else(|| {
            ControlError::InvalidRequest(format!("cannot poll {question} without an id"))
        })?;
        let _guard = self.locks.acquire(question.kind, id).await;
        InteractivePoller::new(
            self.transport.as_ref(),
            question.clone(),
            config.unwrap_or(self.config.poll),
        )
        .run(cancel)
        .await
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Approve the one saved action matching `search`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::CheckLimit` unless exactly one saved action
    /// matches.
    pub async fn approve_saved_action(&self, search: &SearchSpec) -> Result<SavedActionApproval> {
        let saved_action = self.get_one::<SavedAction>(search).await?;
        let id = saved_action.id.ok_or_else(|| {
            ControlError::InvalidRequest(format!("{} has no id", saved_action.object_ref()))
        })?;

        let approval = SavedActionApproval {
            id: Some(id),
            approved_flag: true,
        };
        self.submit(&approval).await?;
        tracing::info!(saved_action = %saved_action.object_ref(), "Saved action approved");
        Ok(approval)
    }

    /// Stop the one action matching `search`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidRequest` if the server does not report
    /// the action as stopped afterwards.
    pub async fn stop_action(&self, search: &SearchSpec) -> Result<Action> {
        let action = self.get_one::<Action>(search).await?;
        let target = action.object_ref();
        let id = action
            .id
            .ok_or_else(|| ControlError::InvalidRequest(format!("{target} has no id")))?;

        let stop = ActionStop {
            id: None,
            action: Some(target.clone()),
        };
        self.submit(&stop).await?;

        let refreshed = self.fetch_one::<Action>(id).await?;
        if !refreshed.stopped_flag {
            return Err(ControlError::InvalidRequest(format!(
                "{target} was not stopped by the server"
            )));
        }
        tracing::info!(action = %target, "Action stopped");
        Ok(refreshed)
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete every object of type `R` matching the search.
    ///
    /// Without `really_delete` nothing is deleted and the error lists what
    /// would have been.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::InvalidRequest` for kinds the server cannot
    /// delete, empty searches, and unconfirmed deletes, or
    /// `ControlError::NotFound` if nothing matches.
    pub async fn delete<R: Record>(&self, options: &DeleteOptions) -> Result<Vec<ObjectRef>> {
        if !R::KIND.supports_delete() {
            return Err(ControlError::InvalidRequest(format!(
                "{} cannot be deleted",
                R::KIND
            )));
        }
        if options.search.is_empty() {
            return Err(ControlError::InvalidRequest(format!(
                "refusing to delete {} without a search",
                R::KIND
            )));
        }

        let found = self
            .get::<R>(&options.search, &RetrieveOptions::default())
            .await?
            .into_vec();
        if found.is_empty() {
            return Err(ControlError::NotFound(format!(
                "no {} matched the search",
                R::KIND
            )));
        }
        let targets: Vec<ObjectRef> = found.iter().map(Record::object_ref).collect();

        if !options.really_delete {
            let listed = targets
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ControlError::InvalidRequest(format!(
                "really_delete is not set; would delete {} object(s): {listed}",
                targets.len()
            )));
        }

        for target in &targets {
            self.transport.delete(target).await?;
            tracing::info!(object = %target, "Deleted object");
        }
        Ok(targets)
    }
}

fn decode_export<T: Transport + ?Sized>(
    transport: &T,
    latest: Option<&ResultInfo>,
    format: ExportFormat,
    payload: &[u8],
) -> Result<ResultData> {
    if !format.is_structured() {
        return Ok(ResultData::Encoded {
            format,
            text: String::from_utf8_lossy(payload).into_owned(),
        });
    }

    let mut set = if payload.iter().all(u8::is_ascii_whitespace) {
        ResultSet::default()
    } else {
        transport.decode_result_set(payload)?
    };
    if let Some(info) = latest {
        set.overlay(info);
    }
    Ok(ResultData::Set(set))
}
