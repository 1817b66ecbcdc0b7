//! Stage profiling.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use fleet_scheduler::perf::{profile, PerfReport};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_output, print_single, OutputFormat};

use super::{load_snapshot, CommandContext};

/// Profile the pipeline.
#[derive(Debug, Args)]
pub struct PerfCommand {
    /// Snapshot directory.
    dir: PathBuf,

    /// Number of runs to average over.
    #[arg(long, default_value = "10")]
    repeats: u32,

    /// Decide without preempting.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct StageRow {
    #[tabled(rename = "Stage")]
    stage: &'static str,

    #[tabled(rename = "Mean (ms)")]
    mean_ms: String,
}

fn row(stage: &'static str, mean: Duration) -> StageRow {
    StageRow {
        stage,
        mean_ms: format!("{:.3}", mean.as_secs_f64() * 1000.0),
    }
}

impl PerfCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let snapshot = load_snapshot(&self.dir).await?;
        let engine = ctx.engine(self.dry_run);
        let repeats = self.repeats;
        let report = tokio::task::spawn_blocking(move || profile(&snapshot, &engine, repeats)).await?;

        match ctx.format {
            OutputFormat::Json => print_single(&report),
            OutputFormat::Table => print_report(&report, ctx.format),
        }
        Ok(())
    }
}

fn print_report(report: &PerfReport, format: OutputFormat) {
    println!(
        "{} seq {}: {} nodes, {} tasks, {} users, {} runs",
        "Snapshot".bold(),
        report.seq,
        report.nodes,
        report.tasks,
        report.users,
        report.repeats
    );

    let mean = &report.mean;
    let rows = vec![
        row("pre_assign", mean.pre_assign),
        row("within_limits", mean.within_limits),
        row("running", mean.running),
        row("waiting_init", mean.waiting_init),
        row("matching", mean.matching),
        row("total", mean.total()),
    ];
    print_output(&rows, format);

    println!(
        "{} startup  {} suspend  {} keep running  {} not sure  {} infeasible",
        report.startup.to_string().green(),
        report.suspend.to_string().red(),
        report.keep_running,
        report.not_sure,
        report.infeasible
    );
}
