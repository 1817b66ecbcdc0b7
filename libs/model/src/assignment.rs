//! Scheduler output for one tick.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use fleet_id::{NodeName, SnapshotSeq, TaskId};
use serde::{Deserialize, Serialize};

use crate::{Intent, IntentBatch, IntentKind, Node, ProcessResult, QueueStatus, Snapshot, Task};

/// Actor id stamped on every intent batch.
pub const SCHEDULER_ACTOR: &str = "scheduler";

/// Decisions for one snapshot plus the node frame they imply.
///
/// The sink commits an assignment as a single transaction. Tasks in `tasks`
/// carry the matcher's verdict; a suspended task still lists the nodes it
/// releases in `assigned_nodes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Snapshot the decisions were computed from.
    pub seq: SnapshotSeq,

    /// False when preemption was disabled for this tick.
    pub valid: bool,

    pub decided_at: DateTime<Utc>,

    /// Scheduler-visible nodes with occupancy after the tick.
    pub nodes: Vec<Node>,

    /// Tasks touched by a matcher, in merge order.
    pub tasks: Vec<Task>,

    /// Tasks that can never fit their group.
    #[serde(default)]
    pub infeasible: Vec<TaskId>,

    /// Task ids produced by more than one partition.
    #[serde(default)]
    pub collisions: usize,
}

impl Assignment {
    /// Number of tasks with the given decision.
    pub fn count(&self, result: ProcessResult) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.process_result == result)
            .count()
    }

    /// Decision for a task, if a matcher touched it.
    pub fn decision(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Intents for the remote-execution collaborator.
    ///
    /// One intent per STARTUP, SUSPEND or KEEP_RUNNING decision, in task
    /// frame order. NOT_SURE produces nothing.
    pub fn intents(&self) -> IntentBatch {
        let intents = self
            .tasks
            .iter()
            .filter_map(|task| {
                let kind = match task.process_result {
                    ProcessResult::Startup => IntentKind::Startup,
                    ProcessResult::Suspend => IntentKind::Suspend,
                    ProcessResult::KeepRunning => IntentKind::KeepRunning,
                    ProcessResult::NotSure => return None,
                };
                Some(Intent {
                    task_id: task.id,
                    chain_id: task.chain_id.clone(),
                    user_name: task.user_name.clone(),
                    group: task.group.clone(),
                    kind,
                    nodes: task.assigned_nodes.clone(),
                })
            })
            .collect();

        IntentBatch {
            seq: self.seq,
            issued_at: self.decided_at,
            actor_id: SCHEDULER_ACTOR.to_string(),
            intents,
        }
    }

    /// Task rows as they will look once the decisions are enacted.
    ///
    /// STARTUP becomes SCHEDULED on its nodes with a fresh placement clock.
    /// SUSPEND returns to QUEUED with no nodes. Other rows only pick up the
    /// verdict fields.
    pub fn project(&self, snapshot: &Snapshot) -> Vec<Task> {
        let decided: BTreeMap<TaskId, &Task> = self.tasks.iter().map(|t| (t.id, t)).collect();

        snapshot
            .tasks
            .iter()
            .map(|task| {
                let Some(decision) = decided.get(&task.id) else {
                    return task.clone();
                };

                let mut next = task.clone();
                next.scheduler_result = decision.scheduler_result;
                next.process_result = decision.process_result;
                next.scheduler_msg = decision.scheduler_msg.clone();

                match decision.process_result {
                    ProcessResult::Startup => {
                        next.queue_status = QueueStatus::Scheduled;
                        next.assigned_nodes = decision.assigned_nodes.clone();
                        next.running_seconds = 0;
                    }
                    ProcessResult::Suspend => {
                        next.queue_status = QueueStatus::Queued;
                        next.assigned_nodes.clear();
                        next.running_seconds = 0;
                    }
                    ProcessResult::KeepRunning | ProcessResult::NotSure => {}
                }
                next
            })
            .collect()
    }

    /// The snapshot the provider should deliver once the decisions are
    /// enacted, numbered one past the input.
    pub fn next_snapshot(&self, snapshot: &Snapshot) -> Snapshot {
        let occupancy: BTreeMap<&NodeName, Option<TaskId>> =
            self.nodes.iter().map(|n| (&n.name, n.working)).collect();

        let nodes = snapshot
            .nodes
            .iter()
            .map(|node| {
                let mut next = node.clone();
                if let Some(working) = occupancy.get(&node.name) {
                    next.working = *working;
                }
                next
            })
            .collect();

        Snapshot {
            seq: snapshot.seq.next(),
            valid: snapshot.valid,
            taken_at: snapshot.taken_at,
            nodes,
            tasks: self.project(snapshot),
            users: snapshot.users.clone(),
        }
    }
}
