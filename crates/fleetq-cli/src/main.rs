//! fleetq - ask fleet questions and manage platform objects from a terminal.
//!
//! This is the entry point for the `fleetq` binary.

mod commands;
mod report;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use fleetq_control::{CancelToken, ControlError, Orchestrator};
use fleetq_transport::{HttpTransport, TransportConfig};
use tracing_subscriber::EnvFilter;

use commands::{Command, OutputArgs};

/// fleetq - ask fleet questions and manage platform objects.
#[derive(Parser, Debug)]
#[command(name = "fleetq")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Platform URL.
    #[arg(long, env = "FLEETQ_URL", default_value = "https://localhost")]
    url: String,

    /// Session token for authentication.
    #[arg(long, env = "FLEETQ_SESSION", hide_env_values = true)]
    session: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 60)]
    request_timeout: u64,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,

    #[command(flatten)]
    output: OutputArgs,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            let code = e
                .downcast_ref::<ControlError>()
                .map_or(1, ControlError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_tracing(debug: bool) {
    let default = if debug { "fleetq=debug,warn" } else { "fleetq=info,warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let transport = HttpTransport::new(TransportConfig {
        base_url: cli.url,
        session: cli.session,
        request_timeout_seconds: cli.request_timeout,
        ..TransportConfig::default()
    });
    let orchestrator = Orchestrator::with_defaults(Arc::new(transport));

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    commands::execute(&orchestrator, cli.command, &cli.output, &cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use commands::AskCommand;
    use fleetq_core::ObjectKind;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_manual_ask_with_fragments() {
        let cli = Cli::try_parse_from([
            "fleetq",
            "--url",
            "https://fleet.example.com",
            "ask",
            "manual",
            "-s",
            "Computer Name",
            "-f",
            "Operating System, that contains:Windows",
            "--any",
        ])
        .unwrap();

        assert_eq!(cli.url, "https://fleet.example.com");
        let Command::Ask {
            ask: AskCommand::Manual {
                selectors,
                groupings,
                any,
                ..
            },
        } = cli.command
        else {
            panic!("expected ask manual");
        };
        assert_eq!(selectors, vec!["Computer Name"]);
        assert_eq!(groupings.len(), 1);
        assert!(any);
    }

    #[test]
    fn parses_get_with_kind_and_output() {
        let cli = Cli::try_parse_from([
            "fleetq",
            "get",
            "saved-questions",
            "name:Daily Inventory",
            "--exact",
            "1",
            "--output",
            "/tmp/reports",
        ])
        .unwrap();

        let Command::Get(args) = cli.command else {
            panic!("expected get");
        };
        assert_eq!(args.kind, ObjectKind::SavedQuestion);
        assert_eq!(args.exact, Some(1));
        assert!(cli.output.output.is_some());
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["fleetq", "get", "widgets"]).is_err());
    }
}
