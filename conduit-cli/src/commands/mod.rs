//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod execution;
mod pipeline;

pub use execution::ExecutionCommands;
pub use pipeline::PipelineCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Durable executions managed by the orchestrator
    Execution {
        #[command(subcommand)]
        command: ExecutionCommands,
    },
    /// Direct calls to the execution service for a known run
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Execution { command } => {
            execution::handle_execution_command(command, config).await
        }
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
    }
}
