use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flow_core::{load_settings, GraphDefinition, OpOutcome, Orchestrator};
use shared::domain::ProcessId;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Load a process graph and drive it through the control API")]
struct Cli {
    /// TOML graph definition to seed the model with.
    #[arg(long)]
    graph: PathBuf,
    /// Overrides the control endpoint from flow.toml / environment.
    #[arg(long)]
    control_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    Show,
    Arrange,
    StartAll,
    StopAll,
    Start { process_id: String },
    Stop { process_id: String },
    Pause { process_id: String },
    Restart { process_id: String },
    ClearErrors { process_id: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings()?;
    if let Some(url) = cli.control_url {
        settings.control_url = Some(url);
    }
    if settings.control_url.is_none() {
        warn!("no control endpoint configured; start/stop requests will fail");
    }

    let graph = GraphDefinition::load_file(&cli.graph)?;
    let orchestrator = Orchestrator::from_settings(&settings)?;
    orchestrator
        .load_graph(&graph)
        .await
        .with_context(|| format!("failed to load graph {}", cli.graph.display()))?;

    let failure = run(&orchestrator, cli.command).await;

    let snapshot = orchestrator.snapshot().await;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    if let Some(reason) = failure {
        bail!(reason);
    }
    Ok(())
}

/// Executes one command. Returns a description of the failure, if any.
async fn run(orchestrator: &Orchestrator, command: Command) -> Option<String> {
    match command {
        Command::Show => None,
        Command::Arrange => {
            let arranged = orchestrator.auto_arrange_processes().await;
            info!(arranged, "processes arranged");
            None
        }
        Command::StartAll => {
            let report = orchestrator.start_all_processes().await;
            (!report.failed.is_empty())
                .then(|| format!("{} of {} processes failed to start", report.failed.len(), report.total()))
        }
        Command::StopAll => {
            let report = orchestrator.stop_all_processes().await;
            (!report.failed.is_empty())
                .then(|| format!("{} of {} processes failed to stop", report.failed.len(), report.total()))
        }
        Command::Start { process_id } => {
            outcome_failure(&process_id, orchestrator.start(&process_id.as_str().into()).await)
        }
        Command::Stop { process_id } => {
            outcome_failure(&process_id, orchestrator.stop(&process_id.as_str().into()).await)
        }
        Command::Pause { process_id } => {
            outcome_failure(&process_id, orchestrator.pause(&process_id.as_str().into()).await)
        }
        Command::Restart { process_id } => {
            outcome_failure(&process_id, orchestrator.restart(&process_id.as_str().into()).await)
        }
        Command::ClearErrors { process_id } => {
            let process_id = process_id.map(ProcessId::from);
            let cleared = orchestrator.clear_errors(process_id.as_ref()).await;
            info!(cleared, "error histories cleared");
            None
        }
    }
}

fn outcome_failure(process_id: &str, outcome: OpOutcome) -> Option<String> {
    info!(process_id, ?outcome, "operation finished");
    match outcome {
        OpOutcome::Applied(_) | OpOutcome::Superseded => None,
        OpOutcome::Failed(reason) => Some(reason),
        OpOutcome::NotFound => Some(format!("unknown process {process_id}")),
        OpOutcome::Rejected(status) => Some(format!("{process_id} cannot do that while {status}")),
    }
}
