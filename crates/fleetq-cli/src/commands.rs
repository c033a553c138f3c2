//! Subcommands and their dispatch onto the orchestrator.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use fleetq_control::coerce::parse_search;
use fleetq_control::{
    AskManualOptions, AskParsedOptions, AskSavedOptions, CancelToken, DeleteOptions,
    ExportOptions, Limits, Orchestrator, PollConfig, ResultBundle, ResultOptions, Retrieved,
    RetrieveOptions,
};
use fleetq_core::{
    Action, CombineOp, ExportFormat, Group, ObjectId, ObjectKind, ObjectRef, PackageSpec,
    Question, SavedAction, SavedQuestion, Sensor, SystemSetting, SystemStatus, User, UserRole,
    WhitelistedUrl,
};
use fleetq_transport::Transport;
use serde::Serialize;
use serde_json::Value;

use crate::report::{extension_for, write_report, ReportNaming};

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask a question and wait for its answers.
    Ask {
        #[command(subcommand)]
        ask: AskCommand,
    },
    /// Retrieve objects of one kind.
    Get(GetArgs),
    /// Delete objects of one kind.
    Delete(DeleteArgs),
    /// Export a question's answers through the server-side bulk export.
    Export(ExportArgs),
    /// Show parser candidates for free-form text without asking.
    Parse {
        /// Text to parse.
        text: String,
    },
    /// Approve exactly one saved action.
    Approve {
        /// Search terms (`field:value`, an id, or a name).
        #[arg(required = true)]
        search: Vec<String>,
    },
    /// Stop exactly one running action.
    Stop {
        /// Search terms (`field:value`, an id, or a name).
        #[arg(required = true)]
        search: Vec<String>,
    },
    /// Print the server version.
    Version,
}

/// The three ways to ask a question.
#[derive(Subcommand, Debug)]
pub enum AskCommand {
    /// Build a question from selectors and groupings.
    Manual {
        /// Selector, e.g. `Folder Contents{folderPath=C:\}`. Repeatable.
        #[arg(short = 's', long = "select")]
        selectors: Vec<String>,
        /// Grouping, e.g. `Operating System, that contains:Windows`. Repeatable.
        #[arg(short = 'f', long = "filter")]
        groupings: Vec<String>,
        /// Match any grouping instead of all of them.
        #[arg(long)]
        any: bool,
        /// Question lifetime in seconds.
        #[arg(long)]
        expire_seconds: Option<u64>,
        #[command(flatten)]
        results: ResultArgs,
    },
    /// Re-ask or reuse a saved question.
    Saved {
        /// Search terms identifying one saved question.
        #[arg(required = true)]
        search: Vec<String>,
        /// Force a fresh run even if the last one has answers.
        #[arg(long)]
        refresh: bool,
        #[command(flatten)]
        results: ResultArgs,
    },
    /// Ask the server parser to interpret free-form text.
    Parsed {
        /// Free-form question text.
        text: String,
        /// 1-based index of the parser candidate to ask.
        #[arg(long)]
        pick: Option<usize>,
        #[command(flatten)]
        results: ResultArgs,
    },
}

/// Answer collection flags shared by every ask.
#[derive(Args, Debug, Default)]
pub struct ResultArgs {
    /// Submit without waiting for answers.
    #[arg(long)]
    pub no_results: bool,
    /// Fraction of agents that must report before answers are fetched.
    #[arg(long)]
    pub threshold: Option<f64>,
    /// Seconds to wait for agents to report.
    #[arg(long)]
    pub poll_timeout: Option<u64>,
    /// Fetch only aggregate row counts.
    #[arg(long)]
    pub aggregate: bool,
    /// Fetch answers through a bulk export in this format.
    #[arg(long)]
    pub export: Option<ExportFormat>,
}

impl ResultArgs {
    fn poll(&self) -> Option<PollConfig> {
        if self.threshold.is_none() && self.poll_timeout.is_none() {
            return None;
        }
        let defaults = PollConfig::default();
        Some(PollConfig {
            threshold: self.threshold.unwrap_or(defaults.threshold),
            timeout_seconds: self.poll_timeout.unwrap_or(defaults.timeout_seconds),
            ..defaults
        })
    }

    fn result(&self) -> ResultOptions {
        ResultOptions {
            aggregate: self.aggregate,
            export: self.export.map(|format| ExportOptions {
                format,
                ..ExportOptions::default()
            }),
        }
    }
}

/// Arguments for `get`.
#[derive(Args, Debug)]
pub struct GetArgs {
    /// Object kind, e.g. `sensors` or `saved_question`.
    pub kind: ObjectKind,
    /// Search terms; each one is an alternative match.
    pub search: Vec<String>,
    /// Include hidden objects.
    #[arg(long)]
    pub include_hidden: bool,
    /// Fail unless at least this many objects match.
    #[arg(long)]
    pub min: Option<usize>,
    /// Fail unless at most this many objects match.
    #[arg(long)]
    pub max: Option<usize>,
    /// Fail unless exactly this many objects match.
    #[arg(long)]
    pub exact: Option<usize>,
}

/// Arguments for `delete`.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Object kind.
    pub kind: ObjectKind,
    /// Search terms identifying the objects.
    #[arg(required = true)]
    pub search: Vec<String>,
    /// Actually delete; otherwise only list what would be deleted.
    #[arg(long)]
    pub really: bool,
}

/// Arguments for `export`.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Question id to export.
    pub question_id: u64,
    /// Export format: csv, xml, xml_obj, or cef.
    #[arg(long, default_value = "csv")]
    pub format: ExportFormat,
    /// Text prepended to each row.
    #[arg(long)]
    pub leading_text: Option<String>,
    /// Text appended to each row.
    #[arg(long)]
    pub trailing_text: Option<String>,
}

/// Where results are written in addition to stdout.
#[derive(Args, Debug, Default)]
pub struct OutputArgs {
    /// Directory to write answer reports into.
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,
    /// Prefix for report file names.
    #[arg(long, global = true, default_value = "")]
    pub prefix: String,
    /// Postfix for report file names.
    #[arg(long, global = true, default_value = "")]
    pub postfix: String,
}

impl OutputArgs {
    fn naming(&self) -> ReportNaming {
        ReportNaming {
            prefix: self.prefix.clone(),
            postfix: self.postfix.clone(),
        }
    }
}

/// Run one subcommand to completion.
///
/// # Errors
///
/// Returns any orchestration failure, or an error writing output.
pub async fn execute<T: Transport>(
    orchestrator: &Orchestrator<T>,
    command: Command,
    output: &OutputArgs,
    cancel: &CancelToken,
) -> anyhow::Result<()> {
    match command {
        Command::Ask { ask } => {
            let bundle = ask_question(orchestrator, ask, cancel).await?;
            write_bundle_report(&bundle, output)?;
            print_json(&bundle)
        }
        Command::Get(args) => {
            let search = parse_search(&args.search)?;
            let options = RetrieveOptions {
                limits: Limits {
                    min: args.min,
                    max: args.max,
                    exact: args.exact,
                },
                include_hidden: args.include_hidden,
                defects: None,
            };
            let found = get_objects(orchestrator, args.kind, &search, &options).await?;
            if let Some(dir) = &output.output {
                let text = serde_json::to_string_pretty(&found)?;
                write_report(dir, &output.naming(), args.kind.collection_name(), "json", &text)?;
            }
            print_json(&found)
        }
        Command::Delete(args) => {
            let options = DeleteOptions {
                search: parse_search(&args.search)?,
                really_delete: args.really,
            };
            let deleted = delete_objects(orchestrator, args.kind, &options).await?;
            print_json(&deleted)
        }
        Command::Export(args) => {
            let target = ObjectRef::by_id(ObjectKind::Question, ObjectId::new(args.question_id));
            let options = ExportOptions {
                format: args.format,
                leading_text: args.leading_text,
                trailing_text: args.trailing_text,
                poll: None,
            };
            let data = orchestrator
                .export_result_data(&target, &options, cancel)
                .await?;
            if let Some(dir) = &output.output {
                let stem = format!("question_{}", args.question_id);
                write_report(
                    dir,
                    &output.naming(),
                    &stem,
                    extension_for(&data),
                    &data.to_report_text()?,
                )?;
            }
            print_json(&data)
        }
        Command::Parse { text } => print_json(&orchestrator.parse_query(&text).await?),
        Command::Approve { search } => {
            let approval = orchestrator
                .approve_saved_action(&parse_search(&search)?)
                .await?;
            print_json(&approval)
        }
        Command::Stop { search } => {
            let action = orchestrator.stop_action(&parse_search(&search)?).await?;
            print_json(&action)
        }
        Command::Version => {
            let version = orchestrator.server_version().await?;
            println!("{version}");
            Ok(())
        }
    }
}

async fn ask_question<T: Transport>(
    orchestrator: &Orchestrator<T>,
    ask: AskCommand,
    cancel: &CancelToken,
) -> anyhow::Result<ResultBundle> {
    let bundle = match ask {
        AskCommand::Manual {
            selectors,
            groupings,
            any,
            expire_seconds,
            results,
        } => {
            let mut options = AskManualOptions {
                selectors: selectors.iter().map(|s| s.as_str().into()).collect(),
                groupings: groupings.iter().map(|g| g.as_str().into()).collect(),
                combine: if any { CombineOp::Or } else { CombineOp::And },
                get_results: !results.no_results,
                poll: results.poll(),
                result: results.result(),
                ..AskManualOptions::default()
            };
            options.question.expire_seconds = expire_seconds;
            orchestrator.ask_manual(&options, cancel).await?
        }
        AskCommand::Saved {
            search,
            refresh,
            results,
        } => {
            let mut options = AskSavedOptions::new(parse_search(&search)?);
            options.refresh_data = refresh;
            options.get_results = !results.no_results;
            options.poll = results.poll();
            options.result = results.result();
            orchestrator.ask_saved(&options, cancel).await?
        }
        AskCommand::Parsed {
            text,
            pick,
            results,
        } => {
            let mut options = AskParsedOptions::new(text);
            options.picker = pick;
            options.get_results = !results.no_results;
            options.poll = results.poll();
            options.result = results.result();
            orchestrator.ask_parsed(&options, cancel).await?
        }
    };
    Ok(bundle)
}

fn write_bundle_report(bundle: &ResultBundle, output: &OutputArgs) -> anyhow::Result<()> {
    let (Some(dir), Some(data)) = (&output.output, &bundle.result_data) else {
        return Ok(());
    };
    let stem = bundle
        .question
        .id
        .map_or_else(|| "question".to_string(), |id| format!("question_{id}"));
    let text = data
        .to_report_text()
        .context("failed to render answer data")?;
    write_report(dir, &output.naming(), &stem, extension_for(data), &text)?;
    Ok(())
}

/// Expand `$body` once per retrievable kind with `$record` bound to its type.
macro_rules! with_record_type {
    ($kind:expr, $record:ident => $body:expr) => {
        match $kind {
            ObjectKind::Action => {
                type $record = Action;
                $body
            }
            ObjectKind::Client => {
                type $record = SystemStatus;
                $body
            }
            ObjectKind::Group => {
                type $record = Group;
                $body
            }
            ObjectKind::Package => {
                type $record = PackageSpec;
                $body
            }
            ObjectKind::Question => {
                type $record = Question;
                $body
            }
            ObjectKind::SavedAction => {
                type $record = SavedAction;
                $body
            }
            ObjectKind::SavedQuestion => {
                type $record = SavedQuestion;
                $body
            }
            ObjectKind::Sensor => {
                type $record = Sensor;
                $body
            }
            ObjectKind::Setting => {
                type $record = SystemSetting;
                $body
            }
            ObjectKind::User => {
                type $record = User;
                $body
            }
            ObjectKind::UserRole => {
                type $record = UserRole;
                $body
            }
            ObjectKind::WhitelistedUrl => {
                type $record = WhitelistedUrl;
                $body
            }
            other @ (ObjectKind::SavedActionApproval | ObjectKind::ActionStop) => {
                anyhow::bail!("{other} are submit-only and cannot be listed or deleted")
            }
        }
    };
}

async fn get_objects<T: Transport>(
    orchestrator: &Orchestrator<T>,
    kind: ObjectKind,
    search: &fleetq_core::SearchSpec,
    options: &RetrieveOptions,
) -> anyhow::Result<Value> {
    with_record_type!(kind, R => {
        let found = orchestrator.get::<R>(search, options).await?;
        retrieved_json(found)
    })
}

async fn delete_objects<T: Transport>(
    orchestrator: &Orchestrator<T>,
    kind: ObjectKind,
    options: &DeleteOptions,
) -> anyhow::Result<Vec<ObjectRef>> {
    with_record_type!(kind, R => Ok(orchestrator.delete::<R>(options).await?))
}

fn retrieved_json<R: Serialize>(found: Retrieved<R>) -> anyhow::Result<Value> {
    let value = match found {
        Retrieved::Single(record) => serde_json::to_value(record)?,
        Retrieved::List(records) => serde_json::to_value(records)?,
    };
    Ok(value)
}

fn print_json<V: Serialize + ?Sized>(value: &V) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
