//! Hand-written scenario builder.

use std::collections::BTreeMap;

use chrono::Utc;
use fleet_id::{ChainId, GroupName, NodeName, SnapshotSeq, TaskId, UserName};
use fleet_model::{
    Node, NodeStatus, PriorityTier, ProcessResult, QueueStatus, SchedulerResult, Snapshot, Task,
    TaskType, User, UserRole,
};

/// A queued training task with its own single-attempt chain.
pub fn task(id: u64, user: &str, group: &str, priority: i32, nodes: u32) -> Task {
    Task {
        id: TaskId::new(id),
        chain_id: ChainId::new(format!("chain-{id}")),
        first_id: TaskId::new(id),
        user_name: UserName::new(user),
        group: GroupName::new(group),
        task_type: TaskType::Training,
        queue_status: QueueStatus::Queued,
        priority,
        custom_rank: None,
        nodes,
        assigned_nodes: Vec::new(),
        created_seconds: id,
        running_seconds: 0,
        scheduler_result: SchedulerResult::NotSure,
        process_result: ProcessResult::NotSure,
        scheduler_msg: String::new(),
    }
}

/// `node-{group}-{TIER}` = `quota` for every named tier.
pub fn quota_for(group: &str, quota: i64) -> BTreeMap<String, i64> {
    PriorityTier::NAMED
        .iter()
        .map(|tier| (format!("node-{group}-{tier}"), quota))
        .collect()
}

/// Fluent builder for small snapshots.
///
/// Nodes and tasks are placed in the current group, set with
/// [`ClusterBuilder::group`]. Scheduling a task marks its nodes as working.
#[derive(Debug, Clone)]
pub struct ClusterBuilder {
    seq: u64,
    valid: bool,
    group: String,
    nodes: Vec<Node>,
    tasks: Vec<Task>,
    users: Vec<User>,
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterBuilder {
    pub fn new() -> Self {
        Self {
            seq: 1,
            valid: true,
            group: "default".to_string(),
            nodes: Vec::new(),
            tasks: Vec::new(),
            users: Vec::new(),
        }
    }

    pub fn seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    /// Mark the snapshot stale (observe only).
    pub fn invalid(mut self) -> Self {
        self.valid = false;
        self
    }

    /// Switch the group used by subsequent calls.
    pub fn group(mut self, group: &str) -> Self {
        self.group = group.to_string();
        self
    }

    /// A ready node in the current group.
    pub fn node(mut self, name: &str, room: &str) -> Self {
        self.nodes.push(Node {
            name: NodeName::new(name),
            gpu_count: 8,
            cpu_count: 64,
            memory_gb: 512,
            group: GroupName::new(&self.group),
            origin_group: GroupName::new(&self.group),
            status: NodeStatus::Ready,
            working: None,
            room: room.to_string(),
            leaf: format!("{room}-leaf"),
            spine: format!("{room}-spine"),
            active: true,
        });
        self
    }

    /// `count` ready nodes named `{prefix}1..`.
    pub fn nodes(mut self, prefix: &str, count: usize, room: &str) -> Self {
        for i in 1..=count {
            self = self.node(&format!("{prefix}{i}"), room);
        }
        self
    }

    /// Add an arbitrary node record.
    pub fn node_record(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// An internal user with `quota` nodes at every tier of the current
    /// group.
    pub fn user(self, name: &str, quota: i64) -> Self {
        let quota = quota_for(&self.group, quota);
        self.user_record(User {
            user_name: UserName::new(name),
            role: UserRole::Internal,
            groups: Vec::new(),
            quota,
        })
    }

    pub fn user_record(mut self, user: User) -> Self {
        self.users.push(user);
        self
    }

    /// A queued task in the current group.
    pub fn queued(self, id: u64, user: &str, priority: i32, nodes: u32) -> Self {
        let task = task(id, user, &self.group, priority, nodes);
        self.task(task)
    }

    /// A task running on `assigned`, which must already exist.
    pub fn scheduled(self, id: u64, user: &str, priority: i32, assigned: &[&str]) -> Self {
        let mut task = task(id, user, &self.group, priority, assigned.len() as u32);
        task.queue_status = QueueStatus::Scheduled;
        task.assigned_nodes = assigned.iter().map(|n| NodeName::new(*n)).collect();
        task.running_seconds = 600;
        self.task(task)
    }

    /// Add an arbitrary task record; scheduled tasks occupy their nodes.
    pub fn task(mut self, task: Task) -> Self {
        if task.is_scheduled() {
            for node in self
                .nodes
                .iter_mut()
                .filter(|n| task.assigned_nodes.contains(&n.name))
            {
                node.working = Some(task.id);
            }
        }
        self.tasks.push(task);
        self
    }

    /// Apply `f` to the most recently added task.
    pub fn with_last(mut self, f: impl FnOnce(&mut Task)) -> Self {
        if let Some(task) = self.tasks.last_mut() {
            f(task);
        }
        self
    }

    pub fn build(self) -> Snapshot {
        Snapshot {
            seq: SnapshotSeq::new(self.seq),
            valid: self.valid,
            taken_at: Utc::now(),
            nodes: self.nodes,
            tasks: self.tasks,
            users: self.users,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduled_marks_nodes_working() {
        let snapshot = ClusterBuilder::new()
            .group("a100")
            .nodes("n", 3, "room1")
            .user("alice", 8)
            .scheduled(1, "alice", 20, &["n2", "n3"])
            .build();

        let working: Vec<_> = snapshot.nodes.iter().map(|n| n.working).collect();
        assert_eq!(working, vec![None, Some(TaskId::new(1)), Some(TaskId::new(1))]);
        assert_eq!(snapshot.tasks[0].nodes, 2);
    }

    #[test]
    fn test_user_quota_covers_every_tier() {
        let snapshot = ClusterBuilder::new().group("a100").user("bob", 4).build();
        let quota = &snapshot.users[0].quota;
        assert_eq!(quota.len(), PriorityTier::NAMED.len());
        assert_eq!(quota.get("node-a100-EXTREME_HIGH"), Some(&4));
        assert_eq!(quota.get("node-a100-AUTO"), Some(&4));
    }
}
