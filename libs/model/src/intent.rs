//! Intents handed to the remote-execution collaborator.
//!
//! An intent records what the scheduler decided, not what has happened.
//! Enactment is eventually consistent and retried by the collaborator.

use chrono::{DateTime, Utc};
use fleet_id::{ChainId, GroupName, NodeName, SnapshotSeq, TaskId, UserName};
use serde::{Deserialize, Serialize};

/// What should happen to a task's containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Startup,
    Suspend,
    KeepRunning,
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IntentKind::Startup => "task.startup",
            IntentKind::Suspend => "task.suspend",
            IntentKind::KeepRunning => "task.keep_running",
        };
        write!(f, "{}", s)
    }
}

/// A single task-level intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub task_id: TaskId,
    pub chain_id: ChainId,
    pub user_name: UserName,
    pub group: GroupName,
    pub kind: IntentKind,

    /// Nodes to start on (startup), release (suspend) or keep (keep running).
    pub nodes: Vec<NodeName>,
}

/// All intents derived from one committed assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentBatch {
    /// Snapshot the decisions were computed from.
    pub seq: SnapshotSeq,

    pub issued_at: DateTime<Utc>,

    /// Identifier of the issuing scheduler.
    pub actor_id: String,

    pub intents: Vec<Intent>,
}

impl IntentBatch {
    /// Intents that change container state (startup or suspend).
    pub fn transitions(&self) -> impl Iterator<Item = &Intent> {
        self.intents
            .iter()
            .filter(|i| i.kind != IntentKind::KeepRunning)
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}
