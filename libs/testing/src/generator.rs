//! Seeded synthetic snapshot generator.

use std::collections::BTreeMap;

use chrono::Utc;
use fleet_id::{ChainId, GroupName, NodeName, SnapshotSeq, TaskId, UserName};
use fleet_model::{
    Node, NodeStatus, PriorityTier, ProcessResult, QueueStatus, SchedulerResult, Snapshot, Task,
    TaskType, User, UserRole,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Group every generated node and task belongs to.
pub const GEN_GROUP: &str = "group";

/// Shape of a generated snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenConfig {
    pub user_count: usize,
    pub tasks_per_user: usize,
    pub node_count: usize,
    pub seed: u64,

    /// Share of tasks generated as QUEUED; the rest start SCHEDULED when
    /// enough unassigned nodes remain.
    pub queued_ratio: f64,

    /// Share of tasks that request 30 to 60 nodes instead of 1 to 10.
    pub big_task_ratio: f64,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            user_count: 10,
            tasks_per_user: 200,
            node_count: 1200,
            seed: 0,
            queued_ratio: 0.1,
            big_task_ratio: 0.1,
        }
    }
}

/// Generate a snapshot.
///
/// Scheduled tasks hold disjoint node sets and every held node records its
/// occupant, so the output is a valid scheduler input. Users hold quota at
/// EXTREME_HIGH, which is the priority of every generated task; one user in
/// ten gets a quota far above the node count.
pub fn generate(config: &GenConfig) -> Snapshot {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let group = GroupName::new(GEN_GROUP);

    let mut nodes: Vec<Node> = (0..config.node_count)
        .map(|i| Node {
            name: NodeName::new(format!("node{i}")),
            gpu_count: 8,
            cpu_count: 128,
            memory_gb: 128,
            group: group.clone(),
            origin_group: group.clone(),
            status: NodeStatus::Ready,
            working: None,
            room: if rng.random_bool(0.5) { "room1" } else { "room2" }.to_string(),
            leaf: format!("leaf{}", i / 32),
            spine: format!("spine{}", i / 256),
            active: true,
        })
        .collect();

    let tier = PriorityTier::ExtremeHigh;
    let users: Vec<User> = (0..config.user_count)
        .map(|i| {
            let quota = if rng.random_bool(0.9) {
                rng.random_range(1..=1000)
            } else {
                rng.random_range(10_000..=100_000)
            };
            User {
                user_name: UserName::new(format!("user{i}")),
                role: UserRole::Internal,
                groups: Vec::new(),
                quota: BTreeMap::from([(format!("node-{GEN_GROUP}-{tier}"), quota)]),
            }
        })
        .collect();

    let mut unassigned: Vec<usize> = (0..config.node_count).collect();
    unassigned.shuffle(&mut rng);

    let mut tasks = Vec::with_capacity(config.user_count * config.tasks_per_user);
    for i in 0..config.user_count {
        for j in 0..config.tasks_per_user {
            let id = (i * config.tasks_per_user + j) as u64;
            let want: u32 = if rng.random_bool(config.big_task_ratio) {
                rng.random_range(30..=60)
            } else {
                rng.random_range(1..=10)
            };
            let queued = rng.random_bool(config.queued_ratio);
            let running_seconds = rng.random_range(0..=3600);

            let mut assigned_nodes = Vec::new();
            let mut queue_status = QueueStatus::Queued;
            if !queued && unassigned.len() >= want as usize {
                let split = unassigned.len() - want as usize;
                for index in unassigned.split_off(split) {
                    nodes[index].working = Some(TaskId::new(id));
                    assigned_nodes.push(nodes[index].name.clone());
                }
                queue_status = QueueStatus::Scheduled;
            }

            tasks.push(Task {
                id: TaskId::new(id),
                chain_id: ChainId::new(format!("{i}-{j}")),
                first_id: TaskId::new(id),
                user_name: UserName::new(format!("user{i}")),
                group: group.clone(),
                task_type: TaskType::Training,
                queue_status,
                priority: tier.value().unwrap_or_default(),
                custom_rank: None,
                nodes: want,
                assigned_nodes,
                created_seconds: id,
                running_seconds: if queue_status == QueueStatus::Scheduled {
                    running_seconds
                } else {
                    0
                },
                scheduler_result: SchedulerResult::NotSure,
                process_result: ProcessResult::NotSure,
                scheduler_msg: String::new(),
            });
        }
    }

    Snapshot {
        seq: SnapshotSeq::new(1),
        valid: true,
        taken_at: Utc::now(),
        nodes,
        tasks,
        users,
    }
}
