//! Question lifecycle.
//!
//! All three ask operations share one skeleton: obtain a submitted
//! question, poll it, fetch its answers, and read a final progress
//! snapshot.
//!
//! ```text
//!   ask_manual ── coerce ── resolve ── build ── add ─┐
//!   ask_saved  ── resolve saved ── (refresh loop) ───┼──▶ poll ──▶ data ──▶ info
//!   ask_parsed ── parse ── pick ── add ──────────────┘
//! ```

use fleetq_core::{
    ObjectKind, ParseJob, ParseResult, Question, QuerySpec, Record, SavedQuestion, SearchGroup,
    SearchSpec, Sensor,
};
use fleetq_transport::Transport;
use tokio::time::Instant;

use crate::builder::build_question;
use crate::cancel::CancelToken;
use crate::coerce::{
    parse_groupings, parse_selectors, referenced_names, resolve_query, SensorCatalog,
};
use crate::error::{ControlError, Result};
use crate::gate::parser_requirement;
use crate::service::Orchestrator;
use crate::types::{
    AskManualOptions, AskParsedOptions, AskSavedOptions, PollConfig, RefreshConfig, ResultBundle,
    ResultOptions, RetrieveOptions,
};

impl<T: Transport> Orchestrator<T> {
    /// Build, submit, and optionally wait on a question from fragments.
    ///
    /// With no selectors and no groupings the server's default question is
    /// asked of every agent.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::Validation` for malformed or unknown
    /// fragments, or any polling and transport failure.
    pub async fn ask_manual(
        &self,
        options: &AskManualOptions,
        cancel: &CancelToken,
    ) -> Result<ResultBundle> {
        let spec = QuerySpec {
            selectors: parse_selectors(&options.selectors)?,
            groupings: parse_groupings(&options.groupings)?,
            combine: options.combine,
        };
        let catalog = self.sensor_catalog(&referenced_names(&spec)).await?;
        let spec = resolve_query(spec, &catalog)?;
        let question = build_question(&spec, &catalog, &options.question)?;

        if question.is_default_query() {
            tracing::info!(
                "No selectors or groupings supplied, asking the default question of all agents"
            );
        }

        let question = self.add(&question).await?;
        tracing::info!(
            question = %question.object_ref(),
            query_text = question.query_text.as_deref().unwrap_or_default(),
            "Question asked"
        );

        self.finish_question(
            question,
            None,
            Vec::new(),
            options.get_results,
            options.poll,
            &options.result,
            cancel,
        )
        .await
    }

    /// Re-ask (or reuse) a saved question's latest run.
    ///
    /// A run with no rows is always refreshed. The refresh loop is bounded
    /// by the refresh attempt count and timeout.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::CheckLimit` unless exactly one saved question
    /// matches, `ControlError::RefreshExhausted` if no new run appears in
    /// time, or any polling and transport failure.
    pub async fn ask_saved(
        &self,
        options: &AskSavedOptions,
        cancel: &CancelToken,
    ) -> Result<ResultBundle> {
        let saved = self.get_one::<SavedQuestion>(&options.search).await?;
        let saved_ref = saved.object_ref();
        let last_run = saved
            .question
            .as_ref()
            .and_then(|q| q.id)
            .ok_or_else(|| {
                ControlError::InvalidRequest(format!("{saved_ref} has never been asked"))
            })?;
        let question = self.fetch_one::<Question>(last_run).await?;
        let info = self.result_info(&question.object_ref()).await?;

        let mut refresh = options.refresh_data;
        if info.row_count == 0 && !refresh {
            tracing::info!(
                saved_question = %saved_ref,
                question_id = %last_run,
                "Last run has no rows, forcing a refresh"
            );
            refresh = true;
        }

        let (saved, question) = if refresh {
            let config = options.refresh.unwrap_or(self.config.refresh);
            self.refresh_saved_question(saved, question, config, cancel)
                .await?
        } else {
            (saved, question)
        };

        self.finish_question(
            question,
            Some(saved),
            Vec::new(),
            options.get_results,
            options.poll,
            &options.result,
            cancel,
        )
        .await
    }

    /// Ask the server parser for candidate interpretations of `text`.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::UnsupportedVersion` if the server has no
    /// parser.
    pub async fn parse_query(&self, text: &str) -> Result<Vec<ParseResult>> {
        self.gate
            .require(self.transport.as_ref(), "question parser", &parser_requirement())
            .await?;
        let candidates = self.transport.parse_question(&ParseJob::new(text)).await?;
        tracing::debug!(text = %text, candidates = candidates.len(), "Parsed question text");
        Ok(candidates)
    }

    /// Parse free-form text, submit the picked candidate, and optionally
    /// wait on it.
    ///
    /// # Errors
    ///
    /// Returns `ControlError::ParseJob` if nothing matched and
    /// `ControlError::Picker` if no valid 1-based candidate was picked.
    pub async fn ask_parsed(
        &self,
        options: &AskParsedOptions,
        cancel: &CancelToken,
    ) -> Result<ResultBundle> {
        let text = &options.question_text;
        let candidates = self.parse_query(text).await?;
        if candidates.is_empty() {
            return Err(ControlError::ParseJob(text.clone()));
        }

        let chosen = match options.picker {
            Some(index) if (1..=candidates.len()).contains(&index) => &candidates[index - 1],
            picker => {
                for (index, candidate) in candidates.iter().enumerate() {
                    tracing::error!(
                        index = index + 1,
                        score = candidate.score,
                        question_text = %candidate.question_text,
                        "Parser candidate"
                    );
                }
                tracing::error!(picker = ?picker, text = %text, "Pick one of the candidates above");
                return Err(ControlError::Picker {
                    text: text.clone(),
                    candidates: candidates.len(),
                });
            }
        };

        let question = Question {
            id: None,
            ..chosen.question.clone()
        };
        let question = self.add(&question).await?;
        tracing::info!(
            question = %question.object_ref(),
            query_text = %chosen.question_text,
            "Parsed question asked"
        );

        self.finish_question(
            question,
            None,
            candidates,
            options.get_results,
            options.poll,
            &options.result,
            cancel,
        )
        .await
    }

    async fn sensor_catalog(&self, names: &[String]) -> Result<SensorCatalog> {
        if names.is_empty() {
            return Ok(SensorCatalog::default());
        }
        let search = SearchSpec {
            groups: names
                .iter()
                .map(|name| SearchGroup::single("name", name.clone()))
                .collect(),
        };
        let sensors = self
            .get::<Sensor>(&search, &RetrieveOptions::default())
            .await?
            .into_vec();
        Ok(SensorCatalog::new(sensors))
    }

    async fn refresh_saved_question(
        &self,
        saved: SavedQuestion,
        prior: Question,
        config: RefreshConfig,
        cancel: &CancelToken,
    ) -> Result<(SavedQuestion, Question)> {
        let saved_ref = saved.object_ref();
        let saved_id = saved
            .id
            .ok_or_else(|| ControlError::InvalidRequest(format!("{saved_ref} has no id")))?;
        let _guard = self.locks.acquire(ObjectKind::SavedQuestion, saved_id).await;

        let started = Instant::now();
        let activity = format!("refreshing {saved_ref}");
        let mut last_question_id = prior.id;
        let mut attempts = 0;

        loop {
            cancel.check(&activity)?;
            attempts += 1;

            self.transport.fetch_result_info(&saved_ref).await?;
            let refreshed = self.fetch_one::<SavedQuestion>(saved_id).await?;

            if let Some(candidate_id) = refreshed.question.as_ref().and_then(|q| q.id) {
                let candidate = self.fetch_one::<Question>(candidate_id).await?;
                last_question_id = Some(candidate_id);

                if candidate.query_text != prior.query_text {
                    tracing::info!(
                        saved_question = %saved_ref,
                        attempt = attempts,
                        question_id = %candidate_id,
                        "Refreshed run does not match the saved query text yet"
                    );
                } else if Some(candidate_id) > prior.id {
                    tracing::info!(
                        saved_question = %saved_ref,
                        attempts,
                        question_id = %candidate_id,
                        "Saved question refreshed"
                    );
                    return Ok((refreshed, candidate));
                } else {
                    tracing::debug!(
                        saved_question = %saved_ref,
                        attempt = attempts,
                        "No new run yet"
                    );
                }
            }

            let elapsed = started.elapsed();
            if attempts >= config.max_attempts || elapsed >= config.timeout() {
                tracing::warn!(
                    saved_question = %saved_ref,
                    attempts,
                    elapsed_seconds = elapsed.as_secs(),
                    "Giving up on saved question refresh"
                );
                return Err(ControlError::RefreshExhausted {
                    saved_question: saved_ref.to_string(),
                    attempts,
                    last_question_id,
                });
            }

            let wait = config.delay().min(config.timeout() - elapsed);
            cancel.sleep(wait, &activity).await?;
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_question(
        &self,
        question: Question,
        saved_question: Option<SavedQuestion>,
        parse_results: Vec<ParseResult>,
        get_results: bool,
        poll: Option<PollConfig>,
        result: &ResultOptions,
        cancel: &CancelToken,
    ) -> Result<ResultBundle> {
        let target = question.object_ref();

        let (poller, result_data) = if get_results {
            let report = self.poll_question(&target, poll, cancel).await?;
            let data = self.result_data(&target, result, cancel).await?;
            (Some(report), Some(data))
        } else {
            (None, None)
        };
        let result_info = self.result_info(&target).await?;

        Ok(ResultBundle {
            question,
            saved_question,
            parse_results,
            poller_outcome: poller.as_ref().and_then(|p| p.outcome()),
            poller,
            result_info,
            result_data,
        })
    }
}
