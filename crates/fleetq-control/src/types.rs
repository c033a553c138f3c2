//! Configuration, per-operation options, and result types.
//!
//! Every operation takes an explicit options struct; every recognised
//! option and its default is listed here.

use std::fmt;
use std::time::Duration;

use fleetq_core::{
    CombineOp, ExportFormat, ObjectRef, ParseResult, Question, ResultData, ResultInfo,
    RetrievalDefects, SavedQuestion, SearchSpec,
};
use serde::{Deserialize, Serialize};

use crate::coerce::{GroupingInput, SelectorInput};

// =============================================================================
// Configuration
// =============================================================================

/// Settings for the interactive completion poller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Fraction of estimated agents that must report (0.0 - 1.0).
    #[serde(default = "PollConfig::default_threshold")]
    pub threshold: f64,
    /// Seconds between progress checks.
    #[serde(default = "PollConfig::default_interval_seconds")]
    pub interval_seconds: u64,
    /// Seconds before the poller gives up.
    #[serde(default = "PollConfig::default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl PollConfig {
    const fn default_threshold() -> f64 {
        0.99
    }

    const fn default_interval_seconds() -> u64 {
        5
    }

    const fn default_timeout_seconds() -> u64 {
        600
    }

    /// Interval between ticks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Overall timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            threshold: Self::default_threshold(),
            interval_seconds: Self::default_interval_seconds(),
            timeout_seconds: Self::default_timeout_seconds(),
        }
    }
}

/// Settings for the bulk export poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPollConfig {
    /// Seconds between status checks.
    #[serde(default = "ExportPollConfig::default_interval_seconds")]
    pub interval_seconds: u64,
    /// Seconds before the export is considered failed.
    #[serde(default = "ExportPollConfig::default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl ExportPollConfig {
    const fn default_interval_seconds() -> u64 {
        2
    }

    const fn default_timeout_seconds() -> u64 {
        600
    }

    /// Interval between status checks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Overall timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for ExportPollConfig {
    fn default() -> Self {
        Self {
            interval_seconds: Self::default_interval_seconds(),
            timeout_seconds: Self::default_timeout_seconds(),
        }
    }
}

/// Bounds for the saved question refresh loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Seconds to wait between refresh attempts.
    #[serde(default = "RefreshConfig::default_delay_seconds")]
    pub delay_seconds: u64,
    /// Maximum refresh attempts.
    #[serde(default = "RefreshConfig::default_max_attempts")]
    pub max_attempts: u32,
    /// Seconds before the refresh gives up.
    #[serde(default = "RefreshConfig::default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl RefreshConfig {
    const fn default_delay_seconds() -> u64 {
        30
    }

    const fn default_max_attempts() -> u32 {
        10
    }

    const fn default_timeout_seconds() -> u64 {
        900
    }

    /// Delay between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }

    /// Overall timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            delay_seconds: Self::default_delay_seconds(),
            max_attempts: Self::default_max_attempts(),
            timeout_seconds: Self::default_timeout_seconds(),
        }
    }
}

/// Defaults applied when an operation does not override them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Interactive poller defaults.
    #[serde(default)]
    pub poll: PollConfig,
    /// Bulk export poller defaults.
    #[serde(default)]
    pub export_poll: ExportPollConfig,
    /// Saved question refresh defaults.
    #[serde(default)]
    pub refresh: RefreshConfig,
}

// =============================================================================
// Operation options
// =============================================================================

/// Cardinality constraints applied after retrieval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// At least this many objects.
    #[serde(default)]
    pub min: Option<usize>,
    /// At most this many objects.
    #[serde(default)]
    pub max: Option<usize>,
    /// Exactly this many objects.
    #[serde(default)]
    pub exact: Option<usize>,
}

impl Limits {
    /// Require exactly one object.
    #[must_use]
    pub const fn exactly_one() -> Self {
        Self {
            min: None,
            max: None,
            exact: Some(1),
        }
    }
}

/// Options for generic retrieval.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveOptions {
    /// Cardinality constraints.
    #[serde(default)]
    pub limits: Limits,
    /// Include hidden objects.
    #[serde(default)]
    pub include_hidden: bool,
    /// Override the collection's known defect flags.
    #[serde(default)]
    pub defects: Option<RetrievalDefects>,
}

impl RetrieveOptions {
    /// Options requiring exactly one result.
    #[must_use]
    pub fn exactly_one() -> Self {
        Self {
            limits: Limits::exactly_one(),
            ..Self::default()
        }
    }
}

/// Options for a bulk export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Requested format.
    #[serde(default)]
    pub format: ExportFormat,
    /// Text prepended to each row.
    #[serde(default)]
    pub leading_text: Option<String>,
    /// Text appended to each row.
    #[serde(default)]
    pub trailing_text: Option<String>,
    /// Override the export poller defaults.
    #[serde(default)]
    pub poll: Option<ExportPollConfig>,
}

/// Options for fetching answer data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultOptions {
    /// Fetch only aggregate row counts.
    #[serde(default)]
    pub aggregate: bool,
    /// Fetch through a bulk export instead of a direct read.
    #[serde(default)]
    pub export: Option<ExportOptions>,
}

/// Question level options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOptions {
    /// Requested question lifetime in seconds.
    #[serde(default)]
    pub expire_seconds: Option<u64>,
    /// Skip the server's question lock.
    #[serde(default)]
    pub skip_lock: bool,
}

const fn default_get_results() -> bool {
    true
}

/// Options for asking a manually built question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskManualOptions {
    /// Selector fragments, as text or structured.
    #[serde(default)]
    pub selectors: Vec<SelectorInput>,
    /// Grouping fragments, as text or structured.
    #[serde(default)]
    pub groupings: Vec<GroupingInput>,
    /// How groupings combine.
    #[serde(default)]
    pub combine: CombineOp,
    /// Question level options.
    #[serde(default)]
    pub question: QuestionOptions,
    /// Wait for completion and fetch answers.
    #[serde(default = "default_get_results")]
    pub get_results: bool,
    /// Override the poller defaults.
    #[serde(default)]
    pub poll: Option<PollConfig>,
    /// How answers are fetched.
    #[serde(default)]
    pub result: ResultOptions,
}

impl Default for AskManualOptions {
    fn default() -> Self {
        Self {
            selectors: Vec::new(),
            groupings: Vec::new(),
            combine: CombineOp::default(),
            question: QuestionOptions::default(),
            get_results: default_get_results(),
            poll: None,
            result: ResultOptions::default(),
        }
    }
}

/// Options for asking a saved question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskSavedOptions {
    /// Search identifying exactly one saved question.
    pub search: SearchSpec,
    /// Force the server to issue a fresh run.
    #[serde(default)]
    pub refresh_data: bool,
    /// Wait for completion and fetch answers.
    #[serde(default = "default_get_results")]
    pub get_results: bool,
    /// Override the refresh bounds.
    #[serde(default)]
    pub refresh: Option<RefreshConfig>,
    /// Override the poller defaults.
    #[serde(default)]
    pub poll: Option<PollConfig>,
    /// How answers are fetched.
    #[serde(default)]
    pub result: ResultOptions,
}

impl AskSavedOptions {
    /// Options for the saved question matched by `search`.
    #[must_use]
    pub fn new(search: SearchSpec) -> Self {
        Self {
            search,
            refresh_data: false,
            get_results: default_get_results(),
            refresh: None,
            poll: None,
            result: ResultOptions::default(),
        }
    }
}

/// Options for asking a parsed question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskParsedOptions {
    /// Free-form question text.
    pub question_text: String,
    /// 1-based index of the chosen candidate.
    #[serde(default)]
    pub picker: Option<usize>,
    /// Wait for completion and fetch answers.
    #[serde(default = "default_get_results")]
    pub get_results: bool,
    /// Override the poller defaults.
    #[serde(default)]
    pub poll: Option<PollConfig>,
    /// How answers are fetched.
    #[serde(default)]
    pub result: ResultOptions,
}

impl AskParsedOptions {
    /// Options for parsing `question_text`.
    #[must_use]
    pub fn new(question_text: impl Into<String>) -> Self {
        Self {
            question_text: question_text.into(),
            picker: None,
            get_results: default_get_results(),
            poll: None,
            result: ResultOptions::default(),
        }
    }

    /// Choose a candidate by 1-based index.
    #[must_use]
    pub const fn with_picker(mut self, picker: usize) -> Self {
        self.picker = Some(picker);
        self
    }
}

/// Options for deleting objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Search identifying the objects to delete.
    pub search: SearchSpec,
    /// Must be set, otherwise the matched objects are only listed.
    #[serde(default)]
    pub really_delete: bool,
}

// =============================================================================
// State machines
// =============================================================================

/// States of the interactive completion poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    /// Created, no tick yet.
    Pending,
    /// Ticking.
    Polling,
    /// The completion threshold was reached.
    Succeeded,
    /// The timeout elapsed first.
    TimedOut,
    /// The cancel token fired.
    Cancelled,
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Pending => "pending",
            Self::Polling => "polling",
            Self::Succeeded => "succeeded",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// States of a bulk export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    /// Preconditions checked, start request not yet sent.
    NotStarted,
    /// The server is producing the export.
    Running,
    /// The payload is ready.
    Completed,
    /// The job failed or timed out.
    Failed,
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(text)
    }
}

// =============================================================================
// Results
// =============================================================================

/// How an interactive poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollOutcome {
    /// The completion threshold was reached.
    Succeeded,
    /// The timeout elapsed first.
    TimedOut,
}

impl PollOutcome {
    /// True for [`PollOutcome::Succeeded`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// What the interactive poller did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollerReport {
    /// Object that was polled.
    pub target: ObjectRef,
    /// Final state.
    pub state: PollState,
    /// Threshold used.
    pub threshold: f64,
    /// Progress checks made.
    pub ticks: u32,
    /// Wall time spent, in milliseconds.
    pub elapsed_ms: u64,
    /// The last snapshot seen.
    pub last_info: Option<ResultInfo>,
}

impl PollerReport {
    /// The outcome, if the poller reached a reportable terminal state.
    #[must_use]
    pub const fn outcome(&self) -> Option<PollOutcome> {
        match self.state {
            PollState::Succeeded => Some(PollOutcome::Succeeded),
            PollState::TimedOut => Some(PollOutcome::TimedOut),
            PollState::Pending | PollState::Polling | PollState::Cancelled => None,
        }
    }

    /// Fraction reported by the last snapshot.
    #[must_use]
    pub fn last_fraction(&self) -> Option<f64> {
        self.last_info
            .as_ref()
            .and_then(ResultInfo::completion_fraction)
    }
}

/// Aggregate result of a question lifecycle operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    /// The question that was asked (or the saved question's run).
    pub question: Question,
    /// The saved question, for ask-saved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_question: Option<SavedQuestion>,
    /// Parser candidates, for ask-parsed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parse_results: Vec<ParseResult>,
    /// The poller that ran, if results were requested.
    pub poller: Option<PollerReport>,
    /// How polling ended, if results were requested.
    pub poller_outcome: Option<PollOutcome>,
    /// Final progress snapshot.
    pub result_info: ResultInfo,
    /// Answer data, if results were requested.
    pub result_data: Option<ResultData>,
}
