//! Property tests over randomly shaped clusters.

use std::collections::{BTreeMap, BTreeSet};

use fleet_id::{NodeName, TaskId};
use fleet_model::{Assignment, PriorityTier, ProcessResult, QueueStatus, Snapshot};
use fleet_scheduler::config::EngineConfig;
use fleet_scheduler::orchestrator::{digest, schedule};
use fleet_testing::{generate, ClusterBuilder, GenConfig};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct TaskShape {
    user: usize,
    priority: i32,
    nodes: u32,
    scheduled: bool,
}

fn task_shape() -> impl Strategy<Value = TaskShape> {
    (
        0..3usize,
        prop::sample::select(vec![10, 20, 30, 50]),
        1..5u32,
        any::<bool>(),
    )
        .prop_map(|(user, priority, nodes, scheduled)| TaskShape {
            user,
            priority,
            nodes,
            scheduled,
        })
}

#[derive(Debug, Clone)]
struct Cluster {
    snapshot: Snapshot,
    quotas: Vec<i64>,
    node_count: usize,
}

fn build(node_count: usize, quotas: Vec<i64>, tasks: Vec<TaskShape>, valid: bool) -> Cluster {
    let mut builder = ClusterBuilder::new().group("a100").nodes("n", node_count, "room1");
    if !valid {
        builder = builder.invalid();
    }
    for (i, quota) in quotas.iter().enumerate() {
        builder = builder.user(&format!("u{i}"), *quota);
    }

    let mut next_free = 1usize;
    for (i, shape) in tasks.iter().enumerate() {
        let id = i as u64 + 1;
        let user = format!("u{}", shape.user);
        let k = shape.nodes as usize;
        if shape.scheduled && next_free + k - 1 <= node_count {
            let names: Vec<String> = (next_free..next_free + k).map(|n| format!("n{n}")).collect();
            let refs: Vec<&str> = names.iter().map(String::as_str).collect();
            builder = builder.scheduled(id, &user, shape.priority, &refs);
            next_free += k;
        } else {
            builder = builder.queued(id, &user, shape.priority, shape.nodes);
        }
    }

    Cluster {
        snapshot: builder.build(),
        quotas,
        node_count,
    }
}

fn cluster() -> impl Strategy<Value = Cluster> {
    (
        1..12usize,
        prop::collection::vec(0..8i64, 3),
        prop::collection::vec(task_shape(), 0..14),
        any::<bool>(),
    )
        .prop_map(|(nodes, quotas, tasks, valid)| build(nodes, quotas, tasks, valid))
}

fn holding(assignment: &Assignment) -> impl Iterator<Item = &fleet_model::Task> {
    assignment.tasks.iter().filter(|t| {
        matches!(
            t.process_result,
            ProcessResult::Startup | ProcessResult::KeepRunning
        )
    })
}

fn check_exclusive(assignment: &Assignment) -> Result<(), TestCaseError> {
    let mut owners: BTreeMap<&NodeName, TaskId> = BTreeMap::new();
    for task in holding(assignment) {
        for node in &task.assigned_nodes {
            let previous = owners.insert(node, task.id);
            prop_assert!(previous.is_none(), "{node} held by {previous:?} and {}", task.id);
        }
    }
    for node in &assignment.nodes {
        prop_assert_eq!(node.working, owners.get(&node.name).copied());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_nodes_have_at_most_one_occupant(c in cluster()) {
        let assignment = schedule(&c.snapshot, &EngineConfig::default()).assignment;
        check_exclusive(&assignment)?;
    }

    #[test]
    fn prop_held_nodes_within_quota(c in cluster()) {
        let assignment = schedule(&c.snapshot, &EngineConfig::default()).assignment;

        let mut held: BTreeMap<(String, PriorityTier), u32> = BTreeMap::new();
        for task in holding(&assignment) {
            *held
                .entry((task.user_name.to_string(), PriorityTier::from_value(task.priority)))
                .or_default() += task.nodes;
        }
        for ((user, tier), nodes) in held {
            let index: usize = user[1..].parse().unwrap();
            let ceiling = (c.quotas[index] as u32).min(c.node_count as u32);
            prop_assert!(nodes <= ceiling, "{user} holds {nodes} at {tier:?}, ceiling {ceiling}");
        }
    }

    #[test]
    fn prop_scheduled_rows_hold_requested_nodes(c in cluster()) {
        let assignment = schedule(&c.snapshot, &EngineConfig::default()).assignment;
        for task in assignment.project(&c.snapshot) {
            if task.queue_status == QueueStatus::Scheduled {
                prop_assert_eq!(task.assigned_nodes.len(), task.nodes as usize);
            }
        }
    }

    #[test]
    fn prop_preemption_only_hits_lower_priority(c in cluster()) {
        let assignment = schedule(&c.snapshot, &EngineConfig::default()).assignment;
        let started: BTreeSet<TaskId> = assignment
            .tasks
            .iter()
            .filter(|t| t.process_result == ProcessResult::Startup)
            .map(|t| t.id)
            .collect();

        for victim in &assignment.tasks {
            let Some(by) = victim.scheduler_msg.strip_prefix("preempted by task ") else {
                continue;
            };
            prop_assert!(c.snapshot.valid);
            prop_assert!(!started.contains(&victim.id));
            let by: u64 = by.parse().unwrap();
            let preemptor = assignment.decision(TaskId::new(by)).unwrap();
            prop_assert!(victim.priority < preemptor.priority);
        }
    }

    #[test]
    fn prop_every_victim_frees_a_node_its_preemptor_uses(c in cluster()) {
        let assignment = schedule(&c.snapshot, &EngineConfig::default()).assignment;

        for victim in &assignment.tasks {
            let Some(by) = victim.scheduler_msg.strip_prefix("preempted by task ") else {
                continue;
            };
            let by: u64 = by.parse().unwrap();
            let preemptor = assignment.decision(TaskId::new(by)).unwrap();
            prop_assert_eq!(preemptor.process_result, ProcessResult::Startup);
            prop_assert!(
                victim
                    .assigned_nodes
                    .iter()
                    .any(|n| preemptor.assigned_nodes.contains(n)),
                "task {} suspended for {} but none of {:?} are in {:?}",
                victim.id,
                by,
                victim.assigned_nodes,
                preemptor.assigned_nodes
            );
        }
    }

    #[test]
    fn prop_same_snapshot_same_assignment(c in cluster()) {
        let config = EngineConfig::default();
        let first = schedule(&c.snapshot, &config).assignment;
        let second = schedule(&c.snapshot, &config).assignment;
        prop_assert_eq!(digest(&first).unwrap(), digest(&second).unwrap());
    }

    #[test]
    fn prop_generated_snapshots_stay_exclusive(seed in any::<u64>()) {
        let snapshot = generate(&GenConfig {
            user_count: 4,
            tasks_per_user: 20,
            node_count: 128,
            seed,
            ..GenConfig::default()
        });
        let assignment = schedule(&snapshot, &EngineConfig::default()).assignment;
        check_exclusive(&assignment)?;
    }
}
