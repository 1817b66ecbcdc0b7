//! CLI commands.

mod gen;
mod perf;
mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// tick-replay - Generate, replay and profile scheduler ticks.
#[derive(Debug, Parser)]
#[command(name = "tick-replay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Group assigned to records with an empty group label.
    #[arg(long, global = true, env = "FLEET_DEFAULT_GROUP", default_value = "default")]
    default_group: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a synthetic snapshot in the file-provider layout.
    Gen(gen::GenCommand),

    /// Run one tick over a snapshot directory and print the decisions.
    Run(run::RunCommand),

    /// Time each pipeline stage over a snapshot directory.
    Perf(perf::PerfCommand),
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let format = match self.format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        };

        let default_group = fleet_id::GroupName::parse(&self.default_group)
            .map_err(|e| anyhow::anyhow!("invalid --default-group: {e}"))?;

        let ctx = CommandContext {
            format,
            default_group,
        };

        match self.command {
            Commands::Gen(cmd) => cmd.run(ctx).await,
            Commands::Run(cmd) => cmd.run(ctx).await,
            Commands::Perf(cmd) => cmd.run(ctx).await,
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub format: OutputFormat,
    pub default_group: fleet_id::GroupName,
}

impl CommandContext {
    /// Engine settings for this invocation.
    pub fn engine(&self, dry_run: bool) -> fleet_scheduler::config::EngineConfig {
        fleet_scheduler::config::EngineConfig {
            default_group: self.default_group.clone(),
            dry_run,
        }
    }
}

/// Load the snapshot stored in `dir`.
async fn load_snapshot(dir: &std::path::Path) -> Result<fleet_model::Snapshot> {
    use anyhow::Context;
    use fleet_scheduler::provider::{FileSnapshotProvider, SnapshotProvider};

    let provider = FileSnapshotProvider::new(dir);
    let snapshot = provider
        .latest()
        .await
        .with_context(|| format!("failed to load snapshot from {}", dir.display()))?;
    Ok(snapshot)
}
