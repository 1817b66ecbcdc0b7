//! Stage profiling over a fixed snapshot.
//!
//! Runs each pipeline stage repeatedly on the same input and reports the
//! mean wall time per stage alongside the decision counts of the last run.

use std::time::{Duration, Instant};

use fleet_id::SnapshotSeq;
use fleet_model::{Assignment, ProcessResult, Snapshot};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::matcher::match_training;
use crate::orchestrator::{partitions, run_validation, schedule};
use crate::pre_assign::pre_assign;
use crate::rules::{running, waiting_init, within_limits, Verdicts};

/// Mean stage timings over `repeats` runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageProfile {
    pub pre_assign: Duration,
    pub within_limits: Duration,
    pub running: Duration,
    pub waiting_init: Duration,
    pub matching: Duration,
}

impl StageProfile {
    pub fn total(&self) -> Duration {
        self.pre_assign + self.within_limits + self.running + self.waiting_init + self.matching
    }
}

/// Result of profiling one snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PerfReport {
    pub seq: SnapshotSeq,
    pub repeats: u32,
    pub nodes: usize,
    pub tasks: usize,
    pub users: usize,
    pub mean: StageProfile,
    pub startup: usize,
    pub suspend: usize,
    pub keep_running: usize,
    pub not_sure: usize,
    pub infeasible: usize,
}

impl PerfReport {
    fn counts(mut self, assignment: &Assignment) -> Self {
        self.startup = assignment.count(ProcessResult::Startup);
        self.suspend = assignment.count(ProcessResult::Suspend);
        self.keep_running = assignment.count(ProcessResult::KeepRunning);
        self.not_sure = assignment.count(ProcessResult::NotSure);
        self.infeasible = assignment.infeasible.len();
        self
    }
}

fn timed<T>(total: &mut Duration, f: impl FnOnce() -> T) -> T {
    let started = Instant::now();
    let value = f();
    *total += started.elapsed();
    value
}

/// Profile the pipeline stages on `snapshot`. `repeats` is at least one.
pub fn profile(snapshot: &Snapshot, config: &EngineConfig, repeats: u32) -> PerfReport {
    let repeats = repeats.max(1);
    let mut sum = StageProfile::default();

    for _ in 0..repeats {
        let mut ws = timed(&mut sum.pre_assign, || {
            pre_assign(snapshot, &config.default_group)
        });
        if config.dry_run {
            ws.valid = false;
        }
        let n = ws.group_sizes.clone();
        let verdicts = Verdicts {
            within_limits: timed(&mut sum.within_limits, || within_limits(&ws, &n)),
            running: timed(&mut sum.running, || running(&ws, &n)),
            waiting_init: timed(&mut sum.waiting_init, || waiting_init(&ws, &n)),
        };
        timed(&mut sum.matching, || {
            let validation = run_validation(&ws, &verdicts);
            partitions(&ws, &verdicts, &validation.frame)
                .into_iter()
                .map(match_training)
                .count()
        });
    }

    let mean = StageProfile {
        pre_assign: sum.pre_assign / repeats,
        within_limits: sum.within_limits / repeats,
        running: sum.running / repeats,
        waiting_init: sum.waiting_init / repeats,
        matching: sum.matching / repeats,
    };

    let report = PerfReport {
        seq: snapshot.seq,
        repeats,
        nodes: snapshot.nodes.len(),
        tasks: snapshot.tasks.len(),
        users: snapshot.users.len(),
        mean,
        startup: 0,
        suspend: 0,
        keep_running: 0,
        not_sure: 0,
        infeasible: 0,
    };
    report.counts(&schedule(snapshot, config).assignment)
}
