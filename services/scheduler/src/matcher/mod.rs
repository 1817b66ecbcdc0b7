//! Matching of tasks to nodes.
//!
//! A matcher consumes one [`Partition`] (a group's nodes and tasks, with rule
//! verdicts attached) and returns a [`MatchOutcome`]. Partitions are owned
//! values, so groups can be matched on separate threads.
//!
//! ## Design Principles
//!
//! - Scheduled tasks keep their nodes unless their running verdict fails
//! - The admission queue is walked greedily with no head-of-line blocking
//! - Preemption only ever suspends strictly lower-priority work
//! - A task needing more nodes than the group has is surfaced, not dropped
//!
//! Validation tasks go through [`validation::match_validation`] first; the
//! training pass in [`training::match_training`] sees the node frame it
//! leaves behind.

pub mod placement;
pub mod training;
pub mod validation;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use fleet_id::{GroupName, NodeName, TaskId};
use fleet_model::{Node, ProcessResult, SchedulerResult, Task};
use tracing::warn;

use crate::pre_assign::PreparedTask;
use crate::rules::{Denial, TaskVerdict};

pub use training::match_training;
pub use validation::match_validation;

/// A task and its rule verdicts.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub task: PreparedTask,
    pub verdict: TaskVerdict,
}

impl Candidate {
    pub fn id(&self) -> TaskId {
        self.task.task.id
    }

    /// Both admission rules passed.
    pub fn admission(&self) -> Result<(), Denial> {
        self.verdict
            .waiting_init
            .clone()
            .and_then(|()| self.verdict.within_limits.clone())
    }

    /// Admission queue order: rank, then oldest first, then id.
    fn queue_cmp(&self, other: &Self) -> Ordering {
        self.task
            .rank_cmp(&other.task)
            .then_with(|| self.task.task.created_seconds.cmp(&other.task.task.created_seconds))
            .then_with(|| self.id().cmp(&other.id()))
    }
}

/// One group's share of a tick.
#[derive(Debug, Clone)]
pub struct Partition {
    pub group: GroupName,

    /// False disables preemption.
    pub valid: bool,

    /// Every active node of the group.
    pub nodes: Vec<Node>,

    pub candidates: Vec<Candidate>,
}

/// Result of matching one partition.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    /// The partition's nodes with occupancy after matching.
    pub nodes: Vec<Node>,

    /// Decided tasks in decision order.
    pub tasks: Vec<Task>,

    pub infeasible: Vec<TaskId>,
}

/// A running task that may be preempted later in the walk.
#[derive(Debug, Clone)]
struct Holder {
    id: TaskId,
    priority: i32,
    running_seconds: u64,
    nodes: Vec<NodeName>,
}

/// Mutable state of one partition while it is being matched.
#[derive(Debug)]
struct MatchState {
    group: GroupName,
    active: usize,
    nodes: BTreeMap<NodeName, Node>,
    free: BTreeSet<NodeName>,
    decisions: Vec<Task>,
    index: BTreeMap<TaskId, usize>,
    holders: Vec<Holder>,
    infeasible: Vec<TaskId>,
}

impl MatchState {
    fn new(group: GroupName, nodes: Vec<Node>) -> Self {
        let active = nodes.len();
        let free = nodes
            .iter()
            .filter(|n| n.is_free() && n.is_ready())
            .map(|n| n.name.clone())
            .collect();
        let nodes = nodes.into_iter().map(|n| (n.name.clone(), n)).collect();
        Self {
            group,
            active,
            nodes,
            free,
            decisions: Vec::new(),
            index: BTreeMap::new(),
            holders: Vec::new(),
            infeasible: Vec::new(),
        }
    }

    fn free_nodes(&self) -> Vec<&Node> {
        self.free
            .iter()
            .filter_map(|name| self.nodes.get(name))
            .collect()
    }

    fn free_count(&self) -> usize {
        self.free.len()
    }

    fn record(&mut self, mut task: Task, process: ProcessResult, verdict: SchedulerResult, msg: String) {
        task.process_result = process;
        task.scheduler_result = verdict;
        task.scheduler_msg = msg;
        self.index.insert(task.id, self.decisions.len());
        self.decisions.push(task);
    }

    /// Return a task's nodes to the pool. Returns the nodes that became free.
    fn release(&mut self, id: TaskId, names: &[NodeName]) -> Vec<NodeName> {
        let mut freed = Vec::new();
        for name in names {
            let Some(node) = self.nodes.get_mut(name) else {
                continue;
            };
            if node.working != Some(id) {
                continue;
            }
            node.working = None;
            if node.is_ready() {
                self.free.insert(name.clone());
                freed.push(name.clone());
            }
        }
        freed
    }

    /// Running task passed its verdict: keep its nodes.
    fn keep(&mut self, prepared: PreparedTask, preemptible: bool) {
        if preemptible {
            self.holders.push(Holder {
                id: prepared.task.id,
                priority: prepared.effective_priority,
                running_seconds: prepared.task.running_seconds,
                nodes: prepared.task.assigned_nodes.clone(),
            });
        }
        self.record(
            prepared.task,
            ProcessResult::KeepRunning,
            SchedulerResult::CanRun,
            String::new(),
        );
    }

    /// Running task failed its verdict: suspend and free its nodes.
    fn suspend(&mut self, task: Task, denial: &Denial) {
        self.release(task.id, &task.assigned_nodes);
        self.record(
            task,
            ProcessResult::Suspend,
            SchedulerResult::CannotRun,
            denial.to_string(),
        );
    }

    /// Queued task that rules keep waiting.
    fn hold_back(&mut self, task: Task, denial: &Denial) {
        self.record(
            task,
            ProcessResult::NotSure,
            SchedulerResult::CannotRun,
            denial.to_string(),
        );
    }

    /// Returns true and records the task if it can never fit the group.
    fn reject_infeasible(&mut self, task: &Task) -> bool {
        let requested = task.nodes as usize;
        if requested <= self.active {
            return false;
        }
        warn!(
            task_id = %task.id,
            group = %self.group,
            requested,
            active = self.active,
            "Task can never be placed: requests more nodes than the group has"
        );
        let msg = format!(
            "infeasible: requests {requested} nodes but group {} has {} active nodes",
            self.group, self.active
        );
        self.infeasible.push(task.id);
        self.record(task.clone(), ProcessResult::NotSure, SchedulerResult::CannotRun, msg);
        true
    }

    fn start(&mut self, mut task: Task, chosen: Vec<NodeName>) {
        for name in &chosen {
            self.free.remove(name);
            if let Some(node) = self.nodes.get_mut(name) {
                node.working = Some(task.id);
            }
        }
        let msg = format!("starting on {} nodes in group {}", chosen.len(), self.group);
        task.assigned_nodes = chosen;
        task.running_seconds = 0;
        self.record(task, ProcessResult::Startup, SchedulerResult::CanRun, msg);
    }

    /// Queued task that passed the rules but found no room this tick.
    fn wait(&mut self, task: Task) {
        let msg = format!(
            "waiting for {} free nodes in group {} ({} free)",
            task.nodes,
            self.group,
            self.free_count()
        );
        self.record(task, ProcessResult::NotSure, SchedulerResult::CanRun, msg);
    }

    fn finish(self) -> MatchOutcome {
        MatchOutcome {
            nodes: self.nodes.into_values().collect(),
            tasks: self.decisions,
            infeasible: self.infeasible,
        }
    }
}
