//! Synthetic snapshot generation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use fleet_scheduler::provider::FileSnapshotProvider;
use fleet_testing::{generate, GenConfig};

use crate::output::{print_single, print_success, OutputFormat};

use super::CommandContext;

/// Generate a snapshot.
#[derive(Debug, Args)]
pub struct GenCommand {
    /// Number of users.
    #[arg(long, default_value = "10")]
    users: usize,

    /// Tasks generated per user.
    #[arg(long, default_value = "200")]
    tasks_per_user: usize,

    /// Number of nodes.
    #[arg(long, default_value = "1200")]
    nodes: usize,

    /// RNG seed; the same seed always yields the same snapshot.
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Share of tasks left queued (0.0 - 1.0).
    #[arg(long, default_value = "0.1")]
    queued_ratio: f64,

    /// Directory to write nodes.json, tasks.json and users.json to.
    #[arg(long)]
    out: PathBuf,
}

impl GenCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        if !(0.0..=1.0).contains(&self.queued_ratio) {
            anyhow::bail!("--queued-ratio must be between 0 and 1");
        }

        let config = GenConfig {
            user_count: self.users,
            tasks_per_user: self.tasks_per_user,
            node_count: self.nodes,
            seed: self.seed,
            queued_ratio: self.queued_ratio,
            ..GenConfig::default()
        };
        let snapshot = generate(&config);
        let (nodes, tasks, users) = (
            snapshot.nodes.len(),
            snapshot.tasks.len(),
            snapshot.users.len(),
        );

        FileSnapshotProvider::new(&self.out)
            .publish(snapshot)
            .await
            .with_context(|| format!("failed to write snapshot to {}", self.out.display()))?;

        match ctx.format {
            OutputFormat::Table => print_success(&format!(
                "Wrote {nodes} nodes, {tasks} tasks and {users} users to {}",
                self.out.display()
            )),
            OutputFormat::Json => print_single(&serde_json::json!({
                "out": self.out,
                "config": config,
                "nodes": nodes,
                "tasks": tasks,
                "users": users,
            })),
        }
        Ok(())
    }
}
