//! Pre-assignment: join and normalize a snapshot into the working set.
//!
//! No decisions are made here. Everything the rules and the matcher look up
//! per task is resolved once: group labels, effective priority and tier,
//! chain heads, quota tables and visible node counts.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use fleet_id::{ChainId, GroupName, NodeName, SnapshotSeq, TaskId, UserName};
use fleet_model::{Node, PriorityTier, Snapshot, Task, User, AUTO_PRIORITY};
use tracing::{debug, instrument, warn};

use crate::quota::{QuotaParseStats, QuotaTable};

/// A task with its per-tick derived columns.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTask {
    /// The task row, with its group normalized.
    pub task: Task,

    /// Priority used for ordering and preemption. External users always
    /// run at AUTO.
    pub effective_priority: i32,

    /// Tier the effective priority resolves to.
    pub tier: PriorityTier,

    /// Most recent non-finished attempt of its chain.
    pub is_chain_head: bool,
}

impl PreparedTask {
    pub fn id(&self) -> TaskId {
        self.task.id
    }

    pub fn group(&self) -> &GroupName {
        &self.task.group
    }

    /// Rank order: effective priority desc, then custom rank desc with
    /// unranked tasks last.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .effective_priority
            .cmp(&self.effective_priority)
            .then_with(|| match (self.task.custom_rank, other.task.custom_rank) {
                (Some(a), Some(b)) => b.total_cmp(&a),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    }
}

/// A user with resolved quota and node visibility.
#[derive(Debug, Clone)]
pub struct UserView {
    pub user: User,
    pub quota: QuotaTable,

    /// Visible node count per group.
    pub visible: BTreeMap<GroupName, usize>,
}

impl UserView {
    pub fn visible_in(&self, group: &GroupName) -> usize {
        self.visible.get(group).copied().unwrap_or(0)
    }
}

/// Anomalies found while building the working set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreAssignStats {
    pub inactive_nodes: usize,
    pub duplicate_nodes: usize,
    pub duplicate_tasks: usize,

    /// Nodes whose `working` field was not backed by a scheduled task.
    pub stale_occupancy: usize,

    /// Node claims by a second scheduled task.
    pub double_booked: usize,

    pub quota: QuotaParseStats,
}

/// A scheduled task's claim on a node another scheduled task already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConflict {
    pub node: NodeName,
    pub holder: TaskId,
}

/// Normalized input for rules and matching.
#[derive(Debug, Clone)]
pub struct WorkingSet {
    pub seq: SnapshotSeq,
    pub valid: bool,
    pub taken_at: DateTime<Utc>,

    /// Active nodes by name, with occupancy rebuilt from scheduled tasks.
    pub nodes: BTreeMap<NodeName, Node>,

    /// Tasks in snapshot order.
    pub tasks: Vec<PreparedTask>,

    pub users: BTreeMap<UserName, UserView>,

    /// Scheduled tasks that claim a node held by an earlier row, keyed by
    /// claimant. Only the first conflicting node is kept per claimant.
    pub conflicts: BTreeMap<TaskId, NodeConflict>,

    /// Active node count per group.
    pub group_sizes: BTreeMap<GroupName, usize>,

    pub stats: PreAssignStats,
}

impl WorkingSet {
    /// Every group holding a node or a task, in name order.
    pub fn groups(&self) -> BTreeSet<GroupName> {
        self.group_sizes
            .keys()
            .cloned()
            .chain(self.tasks.iter().map(|t| t.task.group.clone()))
            .collect()
    }

    pub fn group_size(&self, group: &GroupName) -> usize {
        self.group_sizes.get(group).copied().unwrap_or(0)
    }

    /// Head of each chain with a non-finished attempt.
    pub fn chain_heads(&self) -> BTreeMap<&ChainId, TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.is_chain_head)
            .map(|t| (&t.task.chain_id, t.task.id))
            .collect()
    }
}

fn normalize(group: &GroupName, default_group: &GroupName) -> GroupName {
    if group.is_empty() {
        default_group.clone()
    } else {
        group.clone()
    }
}

/// Build the working set for one tick.
#[instrument(skip(snapshot, default_group), fields(seq = %snapshot.seq))]
pub fn pre_assign(snapshot: &Snapshot, default_group: &GroupName) -> WorkingSet {
    let mut stats = PreAssignStats::default();

    // Nodes: active only, last row wins.
    let mut nodes: BTreeMap<NodeName, Node> = BTreeMap::new();
    for node in &snapshot.nodes {
        if !node.active {
            stats.inactive_nodes += 1;
            continue;
        }
        let mut node = node.clone();
        node.group = normalize(&node.group, default_group);
        node.origin_group = normalize(&node.origin_group, default_group);
        if nodes.insert(node.name.clone(), node).is_some() {
            stats.duplicate_nodes += 1;
        }
    }

    // Tasks: first row wins.
    let mut seen = BTreeSet::new();
    let mut tasks: Vec<Task> = Vec::with_capacity(snapshot.tasks.len());
    for task in &snapshot.tasks {
        if !seen.insert(task.id) {
            stats.duplicate_tasks += 1;
            continue;
        }
        let mut task = task.clone();
        task.group = normalize(&task.group, default_group);
        tasks.push(task);
    }

    // Chain head: greatest id among non-finished attempts.
    let mut heads: BTreeMap<&ChainId, TaskId> = BTreeMap::new();
    for task in tasks.iter().filter(|t| !t.is_finished()) {
        heads
            .entry(&task.chain_id)
            .and_modify(|head| *head = (*head).max(task.id))
            .or_insert(task.id);
    }
    let head_ids: BTreeSet<TaskId> = heads.values().copied().collect();

    // Occupancy comes from scheduled tasks only.
    let previously_working: BTreeMap<NodeName, TaskId> = nodes
        .values()
        .filter_map(|n| n.working.map(|id| (n.name.clone(), id)))
        .collect();
    for node in nodes.values_mut() {
        node.working = None;
    }
    let mut conflicts: BTreeMap<TaskId, NodeConflict> = BTreeMap::new();
    for task in tasks.iter().filter(|t| t.is_scheduled()) {
        for name in &task.assigned_nodes {
            let Some(node) = nodes.get_mut(name) else {
                continue;
            };
            match node.working {
                None => node.working = Some(task.id),
                Some(holder) => {
                    stats.double_booked += 1;
                    warn!(
                        node = %name,
                        holder = %holder,
                        claimant = %task.id,
                        "Node claimed by two scheduled tasks; keeping first holder"
                    );
                    conflicts.entry(task.id).or_insert_with(|| NodeConflict {
                        node: name.clone(),
                        holder,
                    });
                }
            }
        }
    }
    stats.stale_occupancy = previously_working
        .iter()
        .filter(|(name, id)| nodes.get(*name).and_then(|n| n.working) != Some(**id))
        .count();

    let mut group_sizes: BTreeMap<GroupName, usize> = BTreeMap::new();
    for node in nodes.values() {
        *group_sizes.entry(node.group.clone()).or_default() += 1;
    }

    // Users: last row wins, quota resolved against every row.
    let owners: BTreeMap<UserName, User> = snapshot
        .users
        .iter()
        .map(|u| (u.user_name.clone(), u.clone()))
        .collect();
    let users: BTreeMap<UserName, UserView> = owners
        .values()
        .map(|user| {
            let quota = QuotaTable::resolve(user, &owners, &mut stats.quota);
            let visible = visible_nodes(&nodes, &quota);
            (
                user.user_name.clone(),
                UserView {
                    user: user.clone(),
                    quota,
                    visible,
                },
            )
        })
        .collect();

    let tasks: Vec<PreparedTask> = tasks
        .into_iter()
        .map(|task| {
            let external = users
                .get(&task.user_name)
                .is_some_and(|view| !view.user.is_internal());
            let effective_priority = if external {
                AUTO_PRIORITY
            } else {
                task.priority
            };
            PreparedTask {
                is_chain_head: head_ids.contains(&task.id),
                tier: PriorityTier::from_value(effective_priority),
                effective_priority,
                task,
            }
        })
        .collect();

    if stats.quota.rejected() > 0 {
        debug!(
            malformed = stats.quota.malformed,
            unknown_tier = stats.quota.unknown_tier,
            "Quota entries ignored"
        );
    }

    WorkingSet {
        seq: snapshot.seq,
        valid: snapshot.valid,
        taken_at: snapshot.taken_at,
        nodes,
        tasks,
        users,
        conflicts,
        group_sizes,
        stats,
    }
}

/// Nodes a quota holder can see per group: nodes currently in the group,
/// plus nodes lent out from it. Each node is counted once per group.
fn visible_nodes(nodes: &BTreeMap<NodeName, Node>, quota: &QuotaTable) -> BTreeMap<GroupName, usize> {
    let mut visible = BTreeMap::new();
    for group in quota.groups() {
        let count = nodes
            .values()
            .filter(|n| &n.group == group || &n.origin_group == group)
            .count();
        visible.insert(group.clone(), count);
    }
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_model::{QueueStatus, UserRole};
    use fleet_testing::{task, ClusterBuilder};

    fn group(name: &str) -> GroupName {
        GroupName::new(name)
    }

    #[test]
    fn test_inactive_and_duplicate_nodes() {
        let mut snapshot = ClusterBuilder::new()
            .group("a100")
            .nodes("n", 3, "room1")
            .build();
        snapshot.nodes[1].active = false;
        let mut dup = snapshot.nodes[0].clone();
        dup.room = "room9".to_string();
        snapshot.nodes.push(dup);

        let ws = pre_assign(&snapshot, &group("default"));
        assert_eq!(ws.nodes.len(), 2);
        assert_eq!(ws.nodes[&NodeName::new("n1")].room, "room9");
        assert_eq!(ws.stats.inactive_nodes, 1);
        assert_eq!(ws.stats.duplicate_nodes, 1);
        assert_eq!(ws.group_size(&group("a100")), 2);
    }

    #[test]
    fn test_duplicate_tasks_keep_first() {
        let mut snapshot = ClusterBuilder::new()
            .group("a100")
            .queued(1, "alice", 10, 1)
            .build();
        let mut dup = snapshot.tasks[0].clone();
        dup.nodes = 9;
        snapshot.tasks.push(dup);

        let ws = pre_assign(&snapshot, &group("default"));
        assert_eq!(ws.tasks.len(), 1);
        assert_eq!(ws.tasks[0].task.nodes, 1);
        assert_eq!(ws.stats.duplicate_tasks, 1);
    }

    #[test]
    fn test_empty_group_normalized() {
        let snapshot = ClusterBuilder::new()
            .group("")
            .node("n1", "room1")
            .queued(1, "alice", 10, 1)
            .build();

        let ws = pre_assign(&snapshot, &group("shared"));
        assert_eq!(ws.nodes[&NodeName::new("n1")].group, group("shared"));
        assert_eq!(ws.tasks[0].task.group, group("shared"));
    }

    #[test]
    fn test_chain_head_is_latest_unfinished_attempt() {
        let mut retry = task(3, "alice", "a100", 10, 1);
        retry.chain_id = fleet_id::ChainId::new("chain-1");
        let mut later_finished = task(4, "alice", "a100", 10, 1);
        later_finished.chain_id = fleet_id::ChainId::new("chain-1");
        later_finished.queue_status = QueueStatus::Finished;

        let snapshot = ClusterBuilder::new()
            .group("a100")
            .queued(1, "alice", 10, 1)
            .task(retry)
            .task(later_finished)
            .build();

        let ws = pre_assign(&snapshot, &group("default"));
        let heads: Vec<_> = ws.tasks.iter().map(|t| (t.id().value(), t.is_chain_head)).collect();
        assert_eq!(heads, vec![(1, false), (3, true), (4, false)]);
    }

    #[test]
    fn test_external_user_runs_at_auto() {
        let mut snapshot = ClusterBuilder::new()
            .group("a100")
            .user("guest", 4)
            .queued(1, "guest", 50, 1)
            .build();
        snapshot.users[0].role = UserRole::External;

        let ws = pre_assign(&snapshot, &group("default"));
        assert_eq!(ws.tasks[0].effective_priority, AUTO_PRIORITY);
        assert_eq!(ws.tasks[0].tier, PriorityTier::Auto);
        assert_eq!(ws.tasks[0].task.priority, 50);
    }

    #[test]
    fn test_occupancy_rebuilt_from_scheduled_tasks() {
        let mut snapshot = ClusterBuilder::new()
            .group("a100")
            .nodes("n", 3, "room1")
            .scheduled(1, "alice", 10, &["n1"])
            .build();
        // n3 claims an occupant that is not running.
        snapshot.nodes[2].working = Some(TaskId::new(99));

        let ws = pre_assign(&snapshot, &group("default"));
        assert_eq!(ws.nodes[&NodeName::new("n1")].working, Some(TaskId::new(1)));
        assert_eq!(ws.nodes[&NodeName::new("n3")].working, None);
        assert_eq!(ws.stats.stale_occupancy, 1);
    }

    #[test]
    fn test_double_booked_claimant_recorded() {
        let snapshot = ClusterBuilder::new()
            .group("a100")
            .nodes("n", 3, "room1")
            .scheduled(1, "alice", 10, &["n1", "n2"])
            .scheduled(2, "bob", 10, &["n1", "n3"])
            .build();

        let ws = pre_assign(&snapshot, &group("default"));
        assert_eq!(ws.stats.double_booked, 1);
        assert_eq!(ws.nodes[&NodeName::new("n1")].working, Some(TaskId::new(1)));
        assert_eq!(ws.nodes[&NodeName::new("n3")].working, Some(TaskId::new(2)));
        assert_eq!(
            ws.conflicts[&TaskId::new(2)],
            NodeConflict {
                node: NodeName::new("n1"),
                holder: TaskId::new(1),
            }
        );
        assert!(!ws.conflicts.contains_key(&TaskId::new(1)));
    }

    #[test]
    fn test_visible_nodes_include_lent_out() {
        let mut snapshot = ClusterBuilder::new()
            .group("a100")
            .nodes("a", 2, "room1")
            .user("alice", 4)
            .group("h100")
            .nodes("h", 1, "room2")
            .build();
        // a2 is lent to h100 but still visible to a100 quota holders.
        snapshot.nodes[1].group = group("h100");

        let ws = pre_assign(&snapshot, &group("default"));
        let alice = &ws.users[&UserName::new("alice")];
        assert_eq!(alice.visible_in(&group("a100")), 2);
        assert_eq!(alice.visible_in(&group("h100")), 0);
        assert_eq!(ws.group_size(&group("a100")), 1);
    }
}
