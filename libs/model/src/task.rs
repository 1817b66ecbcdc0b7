//! Task records and decision enums.

use fleet_id::{ChainId, GroupName, NodeName, TaskId, UserName};
use serde::{Deserialize, Serialize};

/// Queue status. Moves forward only; a restart is a new task row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    #[default]
    Queued,
    Scheduled,
    Finished,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Training,
    Jupyter,
    Validation,
    Virtual,
    Background,
}

/// Verdict of the admission rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerResult {
    CanRun,
    CannotRun,
    #[default]
    NotSure,
}

/// Decision of the matcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessResult {
    Startup,
    Suspend,
    KeepRunning,
    #[default]
    NotSure,
}

impl ProcessResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "STARTUP",
            Self::Suspend => "SUSPEND",
            Self::KeepRunning => "KEEP_RUNNING",
            Self::NotSure => "NOT_SURE",
        }
    }
}

/// One attempt of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,

    /// Groups every attempt of one logical experiment.
    pub chain_id: ChainId,

    /// Id of the chain's original attempt.
    pub first_id: TaskId,

    pub user_name: UserName,

    #[serde(default)]
    pub group: GroupName,

    #[serde(default)]
    pub task_type: TaskType,

    #[serde(default)]
    pub queue_status: QueueStatus,

    /// Higher is more urgent; `AUTO_PRIORITY` lets the system decide.
    #[serde(default)]
    pub priority: i32,

    /// Secondary tie-break, higher first.
    #[serde(default)]
    pub custom_rank: Option<f64>,

    /// Required node count.
    pub nodes: u32,

    /// Populated only while scheduled.
    #[serde(default)]
    pub assigned_nodes: Vec<NodeName>,

    /// Submission timestamp in seconds; smaller is older.
    #[serde(default)]
    pub created_seconds: u64,

    /// Seconds since the current placement started.
    #[serde(default)]
    pub running_seconds: u64,

    #[serde(default)]
    pub scheduler_result: SchedulerResult,

    #[serde(default)]
    pub process_result: ProcessResult,

    /// Operator-visible explanation of the last decision.
    #[serde(default)]
    pub scheduler_msg: String,
}

impl Task {
    pub fn is_queued(&self) -> bool {
        self.queue_status == QueueStatus::Queued
    }

    pub fn is_scheduled(&self) -> bool {
        self.queue_status == QueueStatus::Scheduled
    }

    pub fn is_finished(&self) -> bool {
        self.queue_status == QueueStatus::Finished
    }

    pub fn is_validation(&self) -> bool {
        self.task_type == TaskType::Validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_wire_names() {
        let json = r#"{
            "id": 7, "chain_id": "c7", "first_id": 7, "user_name": "alice",
            "queue_status": "scheduled", "task_type": "validation", "nodes": 2,
            "process_result": "KEEP_RUNNING"
        }"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert!(task.is_scheduled());
        assert!(task.is_validation());
        assert_eq!(task.process_result, ProcessResult::KeepRunning);
        assert_eq!(task.scheduler_result, SchedulerResult::NotSure);
        assert!(task.custom_rank.is_none());
    }
}
