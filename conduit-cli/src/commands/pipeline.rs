//! Pipeline command handlers
//!
//! Calls that go straight to the execution service through the orchestrator,
//! without creating an execution.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use conduit_core::domain::error_detail::PipelineErrorDetail;
use conduit_core::domain::pipeline::PipelineRunRequest;
use conduit_core::domain::run::PipelineRunStatus;
use std::path::{Path, PathBuf};

use super::execution::colorize_status;
use crate::api::ApiClient;
use crate::config::Config;
use crate::types::read_request;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Check that the pipeline exists and describe it
    Validate {
        /// Path to a JSON pipeline request
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Current status of a run
    Status {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        run_id: String,
    },
    /// Cancel a run
    Cancel {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        run_id: String,
    },
    /// Activity errors of a run
    Errors {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        run_id: String,
    },
}

pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = ApiClient::new(&config.orchestrator_url);

    match command {
        PipelineCommands::Validate { file } => {
            let request = read_request(&file)?;
            let description = client.validate_pipeline(&request).await?;

            if description.pipeline_exists {
                println!(
                    "{} Pipeline {} exists",
                    "✓".green(),
                    description.pipeline_name.bold()
                );
                if let Some(id) = &description.pipeline_id {
                    println!("  ID:         {}", id.dimmed());
                }
                if let Some(kind) = &description.pipeline_type {
                    println!("  Type:       {}", kind);
                }
                println!("  Activities: {}", description.activity_count);
            } else {
                println!(
                    "{} Pipeline {} was not found",
                    "✗".red(),
                    description.pipeline_name.bold()
                );
            }
            Ok(())
        }
        PipelineCommands::Status { file, run_id } => {
            let run = run_request(&file, run_id)?;
            print_run_status(&client.run_status(&run).await?);
            Ok(())
        }
        PipelineCommands::Cancel { file, run_id } => {
            let run = run_request(&file, run_id)?;
            print_run_status(&client.cancel_run(&run).await?);
            Ok(())
        }
        PipelineCommands::Errors { file, run_id } => {
            let run = run_request(&file, run_id)?;
            print_error_detail(&client.run_errors(&run).await?);
            Ok(())
        }
    }
}

fn run_request(file: &Path, run_id: String) -> Result<PipelineRunRequest> {
    let run = PipelineRunRequest::new(read_request(file)?, run_id);
    run.validate()?;
    Ok(run)
}

fn print_run_status(status: &PipelineRunStatus) {
    println!("{}", "Run Status:".bold());
    println!("  Pipeline: {}", status.pipeline_name);
    println!("  Run ID:   {}", status.run_id.cyan());
    println!("  Status:   {}", colorize_status(&status.actual_status));
    if let Some(start) = status.run_start {
        println!("  Started:  {}", start.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(end) = status.run_end {
        println!("  Ended:    {}", end.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(error) = &status.error {
        println!("  Error:    {}", error.red());
    }
}

pub(crate) fn print_error_detail(detail: &PipelineErrorDetail) {
    println!(
        "{}",
        format!(
            "Run {} of {} ({}):",
            detail.run_id, detail.pipeline_name, detail.actual_status
        )
        .bold()
    );

    if detail.is_empty() {
        println!("  {}", "No activity errors recorded.".dimmed());
        return;
    }

    for error in &detail.errors {
        println!("  {} {}", "✗".red(), error.activity_name.bold());
        if let Some(code) = &error.error_code {
            println!("    Code:    {}", code);
        }
        println!("    Message: {}", error.error_message.red());
    }
}
