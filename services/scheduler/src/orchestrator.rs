//! Tick orchestration: fan matching out per group and merge the results.
//!
//! A tick runs in two phases separated by a barrier:
//!
//! 1. Validation tasks are matched over the full node frame, one group at a
//!    time, on a blocking worker together with pre-assignment and the rules.
//!    The node frame they leave behind becomes the free pool.
//! 2. Training tasks are split by group and every group is matched on its
//!    own blocking worker with an owned copy of its partition.
//!
//! Fan-in is deterministic regardless of completion order: results are
//! merged in group-name order, nodes keeping the last writer and tasks the
//! first.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use fleet_id::{GroupName, NodeName, TaskId};
use fleet_model::{Assignment, Node, Snapshot, Task};
use fleet_reconcile::AssignmentDigest;
use tokio::task::JoinSet;
use tracing::{debug, error, instrument};

use crate::config::EngineConfig;
use crate::error::{SchedulerError, TickResult};
use crate::matcher::{match_training, match_validation, Candidate, MatchOutcome, Partition};
use crate::merge::{keep_first, keep_last};
use crate::pre_assign::{pre_assign, PreAssignStats, PreparedTask, WorkingSet};
use crate::rules::{evaluate, Verdicts};

/// Wall time of each pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub pre_assign: Duration,
    pub rules: Duration,
    pub validation: Duration,
    pub training: Duration,
}

impl StageTimings {
    /// Time spent matching, both phases.
    pub fn matching(&self) -> Duration {
        self.validation + self.training
    }

    pub fn total(&self) -> Duration {
        self.pre_assign + self.rules + self.matching()
    }
}

/// Everything one tick produces.
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub assignment: Assignment,
    pub timings: StageTimings,
    pub stats: PreAssignStats,
}

/// Working set and verdicts for one snapshot.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub working_set: WorkingSet,
    pub verdicts: Verdicts,
    pub timings: StageTimings,
}

/// Run pre-assignment and the admission rules.
pub fn prepare(snapshot: &Snapshot, config: &EngineConfig) -> Prepared {
    let mut timings = StageTimings::default();

    let started = Instant::now();
    let mut working_set = pre_assign(snapshot, &config.default_group);
    if config.dry_run {
        working_set.valid = false;
    }
    timings.pre_assign = started.elapsed();

    let started = Instant::now();
    let verdicts = evaluate(&working_set);
    timings.rules = started.elapsed();

    Prepared {
        working_set,
        verdicts,
        timings,
    }
}

/// Split tasks selected by `include` into per-group partitions over `frame`.
///
/// Only scheduled tasks and queued chain heads are carried; a partition
/// exists for every group with at least one such task, in name order.
fn build_partitions(
    ws: &WorkingSet,
    verdicts: &Verdicts,
    frame: &BTreeMap<NodeName, Node>,
    include: impl Fn(&PreparedTask) -> bool,
) -> Vec<Partition> {
    let mut candidates: BTreeMap<&GroupName, Vec<Candidate>> = BTreeMap::new();
    for prepared in &ws.tasks {
        let task = &prepared.task;
        let matchable = task.is_scheduled() || (task.is_queued() && prepared.is_chain_head);
        if !matchable || !include(prepared) {
            continue;
        }
        candidates.entry(&task.group).or_default().push(Candidate {
            task: prepared.clone(),
            verdict: verdicts.for_task(task.id),
        });
    }

    let mut nodes: BTreeMap<&GroupName, Vec<Node>> = BTreeMap::new();
    for node in frame.values() {
        if candidates.contains_key(&node.group) {
            nodes.entry(&node.group).or_default().push(node.clone());
        }
    }

    candidates
        .into_iter()
        .map(|(group, candidates)| Partition {
            group: group.clone(),
            valid: ws.valid,
            nodes: nodes.remove(group).unwrap_or_default(),
            candidates,
        })
        .collect()
}

/// Training partitions over `frame`, one per group.
pub fn partitions(
    ws: &WorkingSet,
    verdicts: &Verdicts,
    frame: &BTreeMap<NodeName, Node>,
) -> Vec<Partition> {
    build_partitions(ws, verdicts, frame, |t| !t.task.is_validation())
}

/// Validation outcome: the node frame training starts from, plus decisions.
#[derive(Debug, Clone)]
pub struct ValidationPhase {
    pub frame: BTreeMap<NodeName, Node>,
    pub tasks: Vec<Task>,
    pub infeasible: Vec<TaskId>,
}

/// Match validation tasks over the full node frame.
pub fn run_validation(ws: &WorkingSet, verdicts: &Verdicts) -> ValidationPhase {
    let parts = build_partitions(ws, verdicts, &ws.nodes, |t| t.task.is_validation());

    let mut touched = Vec::new();
    let mut tasks = Vec::new();
    let mut infeasible = Vec::new();
    for partition in parts {
        let outcome = match_validation(partition);
        touched.extend(outcome.nodes);
        tasks.extend(outcome.tasks);
        infeasible.extend(outcome.infeasible);
    }

    let merged = keep_last(ws.nodes.values().cloned().chain(touched), |n| n.name.clone());
    let frame = merged
        .items
        .into_iter()
        .map(|n| (n.name.clone(), n))
        .collect();

    ValidationPhase {
        frame,
        tasks,
        infeasible,
    }
}

/// Merge both phases into one assignment.
fn assemble(
    ws: &WorkingSet,
    validation: ValidationPhase,
    mut training: Vec<(GroupName, MatchOutcome)>,
) -> Assignment {
    training.sort_by(|a, b| a.0.cmp(&b.0));

    let mut node_rows: Vec<Node> = validation.frame.into_values().collect();
    let mut task_rows: Vec<Task> = validation.tasks;
    let mut infeasible = validation.infeasible;
    for (_, outcome) in training {
        node_rows.extend(outcome.nodes);
        task_rows.extend(outcome.tasks);
        infeasible.extend(outcome.infeasible);
    }

    let mut nodes = keep_last(node_rows, |n| n.name.clone()).items;
    nodes.sort_by(|a, b| a.name.cmp(&b.name));

    let tasks = keep_first(task_rows, |t| t.id);
    if tasks.duplicates > 0 {
        error!(
            seq = %ws.seq,
            collisions = tasks.duplicates,
            "Task decided by more than one partition; keeping first decision"
        );
    }

    infeasible.sort();
    infeasible.dedup();

    Assignment {
        seq: ws.seq,
        valid: ws.valid,
        decided_at: Utc::now(),
        nodes,
        tasks: tasks.items,
        infeasible,
        collisions: tasks.duplicates,
    }
}

/// Run one tick on the calling thread, matching groups in sequence.
///
/// Produces the same assignment as [`run_tick`].
pub fn schedule(snapshot: &Snapshot, config: &EngineConfig) -> TickOutput {
    let Prepared {
        working_set,
        verdicts,
        mut timings,
    } = prepare(snapshot, config);

    let started = Instant::now();
    let validation = run_validation(&working_set, &verdicts);
    timings.validation = started.elapsed();

    let started = Instant::now();
    let training: Vec<(GroupName, MatchOutcome)> =
        partitions(&working_set, &verdicts, &validation.frame)
            .into_iter()
            .map(|p| (p.group.clone(), match_training(p)))
            .collect();
    timings.training = started.elapsed();

    TickOutput {
        assignment: assemble(&working_set, validation, training),
        timings,
        stats: working_set.stats,
    }
}

/// Run one tick off the async executor.
///
/// Pre-assignment, the rules and the validation pass run on one blocking
/// worker; training groups are then matched in parallel on their own.
#[instrument(skip(snapshot, config), fields(seq = %snapshot.seq))]
pub async fn run_tick(snapshot: &Snapshot, config: &EngineConfig) -> TickResult<TickOutput> {
    let owned = snapshot.clone();
    let config = config.clone();
    let (prepared, validation) = tokio::task::spawn_blocking(move || {
        let mut prepared = prepare(&owned, &config);
        let started = Instant::now();
        let validation = run_validation(&prepared.working_set, &prepared.verdicts);
        prepared.timings.validation = started.elapsed();
        (prepared, validation)
    })
    .await
    .map_err(|e| SchedulerError::Worker(e.to_string()))?;
    let Prepared {
        working_set,
        verdicts,
        mut timings,
    } = prepared;

    let started = Instant::now();
    let mut workers = JoinSet::new();
    for partition in partitions(&working_set, &verdicts, &validation.frame) {
        workers.spawn_blocking(move || {
            let group = partition.group.clone();
            (group, match_training(partition))
        });
    }

    let mut training = Vec::with_capacity(workers.len());
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(result) => training.push(result),
            Err(e) => {
                workers.abort_all();
                return Err(SchedulerError::Worker(e.to_string()));
            }
        }
    }
    timings.training = started.elapsed();

    debug!(
        groups = training.len(),
        pre_assign_us = timings.pre_assign.as_micros() as u64,
        rules_us = timings.rules.as_micros() as u64,
        validation_us = timings.validation.as_micros() as u64,
        training_us = timings.training.as_micros() as u64,
        "Tick stages complete"
    );

    Ok(TickOutput {
        assignment: assemble(&working_set, validation, training),
        timings,
        stats: working_set.stats,
    })
}

/// Content digest of an assignment, ignoring when it was decided.
///
/// Two ticks over the same snapshot produce the same digest.
pub fn digest(assignment: &Assignment) -> Result<AssignmentDigest, serde_json::Error> {
    let mut value = serde_json::to_value(assignment)?;
    if let Some(fields) = value.as_object_mut() {
        fields.remove("decided_at");
    }
    Ok(AssignmentDigest::from_json(&value))
}
