//! Replay one tick.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use fleet_model::{Assignment, ProcessResult, Task};
use fleet_scheduler::orchestrator::{digest, run_tick};
use fleet_scheduler::sink::{ApplySink, JsonFileSink};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{print_info, print_output, print_single, print_success, print_warning, OutputFormat};

use super::{load_snapshot, CommandContext};

/// Run one tick.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Snapshot directory.
    dir: PathBuf,

    /// Decide without preempting.
    #[arg(long)]
    dry_run: bool,

    /// Also commit the assignment to this directory.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Include tasks left NOT_SURE.
    #[arg(long)]
    all: bool,
}

/// One decided task.
#[derive(Debug, Clone, Serialize, Tabled)]
struct DecisionRow {
    #[tabled(rename = "Task")]
    id: u64,

    #[tabled(rename = "User")]
    user: String,

    #[tabled(rename = "Group")]
    group: String,

    #[tabled(rename = "Priority")]
    priority: i32,

    #[tabled(rename = "Nodes")]
    nodes: u32,

    #[tabled(rename = "Decision")]
    decision: String,

    #[tabled(rename = "Assigned")]
    assigned: String,

    #[tabled(rename = "Message")]
    message: String,
}

impl From<&Task> for DecisionRow {
    fn from(task: &Task) -> Self {
        let assigned = if task.assigned_nodes.is_empty() {
            "-".to_string()
        } else {
            task.assigned_nodes
                .iter()
                .map(|n| n.as_str())
                .collect::<Vec<_>>()
                .join(",")
        };
        Self {
            id: task.id.value(),
            user: task.user_name.to_string(),
            group: task.group.to_string(),
            priority: task.priority,
            nodes: task.nodes,
            decision: task.process_result.as_str().to_string(),
            assigned,
            message: task.scheduler_msg.clone(),
        }
    }
}

impl RunCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let snapshot = load_snapshot(&self.dir).await?;
        let output = run_tick(&snapshot, &ctx.engine(self.dry_run))
            .await
            .context("tick failed")?;
        let assignment = output.assignment;

        if let Some(out) = &self.out {
            JsonFileSink::new(out)
                .commit(&assignment)
                .await
                .with_context(|| format!("failed to commit to {}", out.display()))?;
        }

        match ctx.format {
            OutputFormat::Json => print_single(&assignment),
            OutputFormat::Table => {
                let rows: Vec<DecisionRow> = assignment
                    .tasks
                    .iter()
                    .filter(|t| self.all || t.process_result != ProcessResult::NotSure)
                    .map(DecisionRow::from)
                    .collect();
                print_output(&rows, ctx.format);
                print_summary(&assignment)?;
                if let Some(out) = &self.out {
                    print_success(&format!("Committed to {}", out.display()));
                }
            }
        }
        Ok(())
    }
}

fn print_summary(assignment: &Assignment) -> Result<()> {
    println!();
    println!(
        "{} seq {}  {} startup  {} suspend  {} keep running  {} not sure",
        "Tick".bold(),
        assignment.seq,
        assignment.count(ProcessResult::Startup).to_string().green(),
        assignment.count(ProcessResult::Suspend).to_string().red(),
        assignment.count(ProcessResult::KeepRunning),
        assignment.count(ProcessResult::NotSure).to_string().dimmed(),
    );
    print_info(&format!("Digest {}", digest(assignment)?));

    if !assignment.valid {
        print_warning("Snapshot marked invalid: preemption was disabled");
    }
    if !assignment.infeasible.is_empty() {
        let ids: Vec<String> = assignment.infeasible.iter().map(|id| id.to_string()).collect();
        print_warning(&format!("Infeasible tasks: {}", ids.join(", ")));
    }
    if assignment.collisions > 0 {
        print_warning(&format!("{} merge collisions", assignment.collisions));
    }
    Ok(())
}
