//! Admission rules.
//!
//! Three stateless predicates over the working set. Each returns the ids it
//! approves and a [`Denial`] for every id it rejects:
//!
//! - [`within_limits`]: fits the user's quota at (group, tier)
//! - [`running`]: a scheduled task may keep its nodes
//! - [`waiting_init`]: a queued chain head may attempt a start
//!
//! `n` is the partition size per group. It caps every quota ceiling, so a
//! quota larger than the cluster behaves like the cluster size.
//!
//! ## Design Principles
//!
//! - Rules never fail: bad quota data resolves to zero quota
//! - Rules are independent: no rule reads another rule's output
//! - Verdicts are deterministic given the same working set

mod running;
mod waiting_init;
mod within_limits;

use std::collections::{BTreeMap, BTreeSet};

use fleet_id::{GroupName, NodeName, TaskId};

use crate::pre_assign::WorkingSet;

pub use running::running;
pub use waiting_init::waiting_init;
pub use within_limits::within_limits;

/// Partition size per group, the `n` every rule is evaluated against.
pub type PartitionSizes = BTreeMap<GroupName, usize>;

/// Why a rule rejected a task. Rendered into `scheduler_msg`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Admitting the task would exceed the quota ceiling.
    OverQuota {
        held: u32,
        requested: u32,
        ceiling: u32,
    },

    /// A running task no longer fits a reduced quota.
    QuotaTightened {
        held: u32,
        requested: u32,
        ceiling: u32,
    },

    /// A newer attempt of the chain exists.
    Superseded { by: TaskId },

    /// Another scheduled task already holds one of the task's nodes.
    DoubleBooked { node: NodeName, holder: TaskId },

    /// The task's user is not in the snapshot.
    UnknownUser,

    NotChainHead,

    NoNodesRequested,

    /// Another attempt of the chain still holds nodes.
    ChainAlreadyRunning { running: TaskId },

    /// The rule was not evaluated for this task.
    NotEvaluated,
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OverQuota {
                held,
                requested,
                ceiling,
            } => write!(
                f,
                "over quota: holding {held} of {ceiling} nodes, requesting {requested}"
            ),
            Self::QuotaTightened {
                held,
                requested,
                ceiling,
            } => write!(
                f,
                "quota reduced to {ceiling} nodes; {held} held by higher-ranked tasks, this task holds {requested}"
            ),
            Self::Superseded { by } => write!(f, "superseded by task {by}"),
            Self::DoubleBooked { node, holder } => {
                write!(f, "node {node} is already held by task {holder}")
            }
            Self::UnknownUser => f.write_str("user not found"),
            Self::NotChainHead => f.write_str("not the latest attempt of its chain"),
            Self::NoNodesRequested => f.write_str("requests no nodes"),
            Self::ChainAlreadyRunning { running } => {
                write!(f, "chain still running as task {running}")
            }
            Self::NotEvaluated => f.write_str("not evaluated"),
        }
    }
}

/// Output of one rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleVerdict {
    pub approved: BTreeSet<TaskId>,
    pub denied: BTreeMap<TaskId, Denial>,
}

impl RuleVerdict {
    pub fn approve(&mut self, id: TaskId) {
        self.approved.insert(id);
    }

    pub fn deny(&mut self, id: TaskId, denial: Denial) {
        self.denied.insert(id, denial);
    }

    pub fn passes(&self, id: TaskId) -> bool {
        self.approved.contains(&id)
    }

    /// `Ok` if approved, otherwise the recorded denial.
    pub fn check(&self, id: TaskId) -> Result<(), Denial> {
        if self.approved.contains(&id) {
            return Ok(());
        }
        Err(self.denied.get(&id).cloned().unwrap_or(Denial::NotEvaluated))
    }

    pub fn len(&self) -> usize {
        self.approved.len() + self.denied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approved.is_empty() && self.denied.is_empty()
    }
}

/// Verdicts of all three rules for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdicts {
    pub within_limits: RuleVerdict,
    pub running: RuleVerdict,
    pub waiting_init: RuleVerdict,
}

/// Per-task view of [`Verdicts`], carried into matcher partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskVerdict {
    pub within_limits: Result<(), Denial>,
    pub running: Result<(), Denial>,
    pub waiting_init: Result<(), Denial>,
}

impl Verdicts {
    pub fn for_task(&self, id: TaskId) -> TaskVerdict {
        TaskVerdict {
            within_limits: self.within_limits.check(id),
            running: self.running.check(id),
            waiting_init: self.waiting_init.check(id),
        }
    }
}

/// Evaluate every rule against the working set's own partition sizes.
pub fn evaluate(ws: &WorkingSet) -> Verdicts {
    let n = &ws.group_sizes;
    Verdicts {
        within_limits: within_limits(ws, n),
        running: running(ws, n),
        waiting_init: waiting_init(ws, n),
    }
}
