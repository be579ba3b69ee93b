//! Execution command handlers
//!
//! Submitting executions, following them and acting on the run behind them.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use conduit_core::domain::orchestration::{InstanceKind, Phase};
use conduit_core::domain::run::{RunStatus, SimpleStatus};
use conduit_core::dto::execution::{ExecutionDetail, ExecutionSummary, StartExecution};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::api::ApiClient;
use crate::config::Config;
use crate::id_resolver::resolve_execution_id;
use crate::types::{IdOrPrefix, read_request};

/// Execution subcommands
#[derive(Subcommand)]
pub enum ExecutionCommands {
    /// Start a pipeline and follow it to completion
    Start {
        /// Path to a JSON pipeline request
        #[arg(short, long)]
        file: PathBuf,

        /// Poll through a separate checker that is signalled with the run id
        #[arg(long)]
        correlated: bool,

        /// Block until the execution finishes
        #[arg(short, long)]
        wait: bool,
    },
    /// Create a checker that waits for a run-started signal
    Check {
        /// Path to a JSON pipeline request
        #[arg(short, long)]
        file: PathBuf,
    },
    /// List recent executions
    List {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show execution details
    Get {
        /// Execution ID or unambiguous prefix
        id: String,

        /// Include the event history
        #[arg(long)]
        history: bool,
    },
    /// Block until an execution finishes
    Wait {
        /// Execution ID or unambiguous prefix
        id: String,
    },
    /// Deliver the run id to a waiting checker
    Signal {
        /// Checker ID or unambiguous prefix
        id: String,

        /// Run id reported by the execution service
        run_id: String,
    },
    /// Cancel the run behind an execution
    Cancel {
        /// Execution ID or unambiguous prefix
        id: String,
    },
    /// Show activity errors of the run behind an execution
    Errors {
        /// Execution ID or unambiguous prefix
        id: String,
    },
}

/// How often `--wait` asks for the execution state
const WAIT_INTERVAL: Duration = Duration::from_secs(2);

pub async fn handle_execution_command(command: ExecutionCommands, config: &Config) -> Result<()> {
    let client = ApiClient::new(&config.orchestrator_url);

    match command {
        ExecutionCommands::Start {
            file,
            correlated,
            wait,
        } => start_execution(&client, file, correlated, wait).await,
        ExecutionCommands::Check { file } => start_check(&client, file).await,
        ExecutionCommands::List { limit } => list_executions(&client, limit).await,
        ExecutionCommands::Get { id, history } => get_execution(&client, &id, history).await,
        ExecutionCommands::Wait { id } => {
            let uuid = resolve(&client, &id).await?;
            wait_for(&client, uuid).await
        }
        ExecutionCommands::Signal { id, run_id } => raise_signal(&client, &id, &run_id).await,
        ExecutionCommands::Cancel { id } => cancel_execution(&client, &id).await,
        ExecutionCommands::Errors { id } => execution_errors(&client, &id).await,
    }
}

async fn resolve(client: &ApiClient, id: &str) -> Result<Uuid> {
    resolve_execution_id(client, &IdOrPrefix::parse(id)).await
}

async fn start_execution(
    client: &ApiClient,
    file: PathBuf,
    correlated: bool,
    wait: bool,
) -> Result<()> {
    let request = read_request(&file)?;
    let pipeline_name = request.pipeline_name.clone();

    let accepted = client
        .start_execution(StartExecution {
            request,
            correlated,
        })
        .await?;

    println!(
        "{} Execution {} accepted for pipeline {}",
        "✓".green(),
        accepted.instance_id.to_string().cyan(),
        pipeline_name.bold()
    );
    println!("  Status: {}", accepted.status_url.dimmed());

    if wait {
        println!();
        wait_for(client, accepted.instance_id).await?;
    }

    Ok(())
}

async fn start_check(client: &ApiClient, file: PathBuf) -> Result<()> {
    let request = read_request(&file)?;
    let accepted = client.start_check(request).await?;

    println!(
        "{} Checker {} is waiting for a run-started signal",
        "✓".green(),
        accepted.instance_id.to_string().cyan()
    );
    println!(
        "  Signal it with: conduit execution signal {} <run-id>",
        accepted.instance_id
    );

    Ok(())
}

async fn list_executions(client: &ApiClient, limit: usize) -> Result<()> {
    let executions = client.list_executions(limit).await?;

    if executions.is_empty() {
        println!("{}", "No executions found.".yellow());
    } else {
        println!(
            "{}",
            format!("Found {} execution(s):", executions.len()).bold()
        );
        println!();
        for execution in executions {
            print_execution_summary(&execution);
        }
    }

    Ok(())
}

async fn get_execution(client: &ApiClient, id: &str, history: bool) -> Result<()> {
    let uuid = resolve(client, id).await?;
    let detail = client.get_execution(uuid).await?;

    print_execution_details(&detail);

    if history {
        println!("\n{}", "History:".bold());
        for entry in &detail.history {
            let event = serde_json::to_string(&entry.event)?;
            println!(
                "  {} {}",
                entry.at.format("%H:%M:%S").to_string().dimmed(),
                event
            );
        }
    }

    Ok(())
}

/// Polls the orchestrator until the execution is complete
async fn wait_for(client: &ApiClient, id: Uuid) -> Result<()> {
    let mut last_phase = None;

    loop {
        let detail = client.get_execution(id).await?;

        if last_phase != Some(detail.summary.phase) {
            println!(
                "  {} {}",
                "▸".cyan(),
                colorize_phase(detail.summary.phase)
            );
            last_phase = Some(detail.summary.phase);
        }

        if detail.simple_status == SimpleStatus::Complete {
            println!();
            print_execution_details(&detail);
            return Ok(());
        }

        tokio::time::sleep(WAIT_INTERVAL).await;
    }
}

async fn raise_signal(client: &ApiClient, id: &str, run_id: &str) -> Result<()> {
    let uuid = resolve(client, id).await?;
    let outcome = client.raise_signal(uuid, run_id).await?;

    if outcome.delivered {
        println!(
            "{} Run {} delivered to checker {}",
            "✓".green(),
            run_id.cyan(),
            uuid
        );
    } else {
        println!(
            "{}",
            format!("Checker {} already had a run id; signal ignored.", uuid).yellow()
        );
    }

    Ok(())
}

async fn cancel_execution(client: &ApiClient, id: &str) -> Result<()> {
    let uuid = resolve(client, id).await?;
    let status = client.cancel_execution(uuid).await?;

    println!(
        "{} Cancel requested for run {} ({})",
        "✓".green(),
        status.run_id.cyan(),
        colorize_status(&status.actual_status)
    );

    Ok(())
}

async fn execution_errors(client: &ApiClient, id: &str) -> Result<()> {
    let uuid = resolve(client, id).await?;
    let detail = client.execution_errors(uuid).await?;
    super::pipeline::print_error_detail(&detail);
    Ok(())
}

fn print_execution_summary(execution: &ExecutionSummary) {
    let kind = match execution.kind {
        InstanceKind::Execute => "Execution",
        InstanceKind::Check => "Checker",
    };

    println!(
        "  {} {} {}",
        "▸".cyan(),
        kind,
        execution.id.to_string().dimmed()
    );
    println!("    Pipeline: {}", execution.pipeline_name);
    println!("    Phase:    {}", colorize_phase(execution.phase));
    if let Some(status) = &execution.actual_status {
        println!("    Run:      {}", colorize_status(status));
    }
    if execution.failed {
        println!("    {}", "failed".red());
    }
    println!(
        "    Created:  {}",
        execution
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_execution_details(detail: &ExecutionDetail) {
    let summary = &detail.summary;

    println!("{}", "Execution Details:".bold());
    println!("  ID:          {}", summary.id.to_string().cyan());
    println!("  Kind:        {:?} ({:?})", summary.kind, detail.correlation);
    if let Some(parent) = summary.parent_id {
        println!("  Parent:      {}", parent.to_string().dimmed());
    }
    println!("  Pipeline:    {}", summary.pipeline_name);
    println!("  Phase:       {}", colorize_phase(summary.phase));
    println!("  Attempt:     {}", summary.attempt);

    if let Some(run_id) = &summary.run_id {
        println!("  Run ID:      {}", run_id);
    }
    if let Some(checker) = detail.check_instance_id {
        println!("  Checker:     {}", checker.to_string().dimmed());
    }
    if let Some(status) = &summary.actual_status {
        println!("  Run Status:  {}", colorize_status(status));
    }
    if let Some(wake) = detail.next_wake_at {
        println!("  Next Wake:   {}", wake.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(output) = &detail.output {
        if let (Some(start), Some(end)) = (output.run_start, output.run_end) {
            let seconds = end.signed_duration_since(start).num_seconds();
            println!("  Duration:    {}s", seconds);
        }
    }

    if let Some(failure) = &detail.failure {
        println!("\n{}", "Failure:".bold());
        println!("{}", failure.to_string().red());
    }
}

fn colorize_phase(phase: Phase) -> ColoredString {
    let text = phase.to_string();
    match phase {
        Phase::NotStarted | Phase::Starting => text.yellow(),
        Phase::WaitingForCorrelation => text.magenta(),
        Phase::Polling => text.cyan(),
        Phase::Terminal => text.bold(),
    }
}

pub(crate) fn colorize_status(status: &RunStatus) -> ColoredString {
    let text = status.as_str().to_string();
    match status {
        RunStatus::Queued => text.yellow(),
        RunStatus::InProgress => text.cyan(),
        RunStatus::Succeeded => text.green(),
        RunStatus::Failed => text.red(),
        RunStatus::Cancelled => text.dimmed(),
        RunStatus::Unknown(_) => text.magenta(),
    }
}
