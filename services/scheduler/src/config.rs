//! Scheduler configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use fleet_id::GroupName;
use fleet_reconcile::{DEFAULT_SLA, DEFAULT_SLA_WINDOW, DEFAULT_TICK_INTERVAL};

/// Scheduler service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Directory the file snapshot provider reads.
    pub snapshot_dir: PathBuf,

    /// Directory committed assignments are written to.
    pub output_dir: PathBuf,

    /// Tick cadence.
    pub tick_interval: Duration,

    /// Matching latency above which a tick counts as an SLA tick.
    pub sla: Duration,

    /// Number of recent ticks the SLA count covers.
    pub sla_window: usize,

    pub engine: EngineConfig,
}

/// Settings consumed by the tick pipeline itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Group assigned to nodes and tasks with an empty group label.
    pub default_group: GroupName,

    /// Treat every snapshot as invalid: decide, but never preempt.
    pub dry_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_group: GroupName::new("default"),
            dry_run: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let log_level = std::env::var("FLEET_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let snapshot_dir = std::env::var("FLEET_SNAPSHOT_DIR")
            .unwrap_or_else(|_| "/var/lib/fleet/snapshot".to_string())
            .into();

        let output_dir = std::env::var("FLEET_OUTPUT_DIR")
            .unwrap_or_else(|_| "/var/lib/fleet/assignments".to_string())
            .into();

        let tick_interval = env_millis("FLEET_TICK_INTERVAL_MS")?.unwrap_or(DEFAULT_TICK_INTERVAL);
        let sla = env_millis("FLEET_SLA_MS")?.unwrap_or(DEFAULT_SLA);

        let sla_window = match std::env::var("FLEET_SLA_WINDOW") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid FLEET_SLA_WINDOW: {raw}"))?,
            Err(_) => DEFAULT_SLA_WINDOW,
        };

        let default_group = match std::env::var("FLEET_DEFAULT_GROUP") {
            Ok(raw) => GroupName::parse(&raw)
                .with_context(|| format!("invalid FLEET_DEFAULT_GROUP: {raw:?}"))?,
            Err(_) => GroupName::new("default"),
        };

        let dry_run = std::env::var("FLEET_DRY_RUN")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            log_level,
            snapshot_dir,
            output_dir,
            tick_interval,
            sla,
            sla_window,
            engine: EngineConfig {
                default_group,
                dry_run,
            },
        })
    }
}

fn env_millis(name: &str) -> Result<Option<Duration>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    let ms: u64 = raw
        .parse()
        .with_context(|| format!("invalid {name}: {raw}"))?;
    Ok(Some(Duration::from_millis(ms)))
}
