//! Training matcher: priority-ordered, locality-aware, with preemption.

use std::collections::BTreeSet;

use fleet_id::{NodeName, TaskId};
use fleet_model::{ProcessResult, SchedulerResult};
use tracing::{debug, info, instrument};

use super::placement::select_nodes;
use super::{Candidate, Holder, MatchOutcome, MatchState, Partition};

/// Match one group's training tasks.
///
/// 1. Scheduled tasks that fail their running verdict are suspended; the
///    rest keep their nodes.
/// 2. Queued chain heads passing `waiting_init` and `within_limits` form the
///    admission queue: priority desc, custom rank desc (unranked last),
///    oldest first, then id.
/// 3. Each queued task takes free nodes if enough exist. Otherwise, when
///    the partition is valid, the fewest strictly lower-priority running
///    tasks needed to fit it are suspended; if even all of them would not
///    make room, nobody is suspended. A task that still does not fit waits and
///    the walk moves on.
#[instrument(skip(partition), fields(group = %partition.group, candidates = partition.candidates.len()))]
pub fn match_training(partition: Partition) -> MatchOutcome {
    let Partition {
        group,
        valid,
        nodes,
        candidates,
    } = partition;
    let mut state = MatchState::new(group, nodes);

    let (running, waiting): (Vec<Candidate>, Vec<Candidate>) = candidates
        .into_iter()
        .filter(|c| !c.task.task.is_validation())
        .filter(|c| c.task.task.is_scheduled() || (c.task.task.is_queued() && c.task.is_chain_head))
        .partition(|c| c.task.task.is_scheduled());

    for candidate in running {
        match &candidate.verdict.running {
            Ok(()) => state.keep(candidate.task, true),
            Err(denial) => state.suspend(candidate.task.task, denial),
        }
    }

    let mut queue = Vec::with_capacity(waiting.len());
    for candidate in waiting {
        if state.reject_infeasible(&candidate.task.task) {
            continue;
        }
        match candidate.admission() {
            Ok(()) => queue.push(candidate),
            Err(denial) => state.hold_back(candidate.task.task, &denial),
        }
    }
    queue.sort_by(|a, b| a.queue_cmp(b));

    for candidate in queue {
        let k = candidate.task.task.nodes as usize;

        if let Some(chosen) = select_nodes(&state.free_nodes(), &BTreeSet::new(), k) {
            state.start(candidate.task.task, chosen);
            continue;
        }

        if valid {
            if let Some(victims) = state.pick_victims(candidate.task.effective_priority, k) {
                let freed = state.preempt(&victims, candidate.id());
                if let Some(chosen) = select_nodes(&state.free_nodes(), &freed, k) {
                    state.start(candidate.task.task, chosen);
                    continue;
                }
            }
        }

        state.wait(candidate.task.task);
    }

    state.finish()
}

impl MatchState {
    /// Smallest set of preemptible holders that makes room for `k` nodes.
    ///
    /// Holders with priority strictly below `priority` are taken in order
    /// priority asc, most recently placed first, then newest id, until `k`
    /// nodes are reachable. The prefix is then walked back from its end and
    /// every holder whose nodes are not needed to reach `k` is spared, so
    /// each remaining victim contributes to any placement of the task.
    /// Returns `None` when even every eligible holder would not suffice.
    fn pick_victims(&self, priority: i32, k: usize) -> Option<Vec<TaskId>> {
        let mut eligible: Vec<_> = self
            .holders
            .iter()
            .filter(|h| h.priority < priority)
            .collect();
        eligible.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.running_seconds.cmp(&b.running_seconds))
                .then_with(|| b.id.cmp(&a.id))
        });

        let mut available = self.free_count();
        let mut prefix: Vec<(TaskId, usize)> = Vec::new();
        for holder in eligible {
            if available >= k {
                break;
            }
            let usable = self.usable_nodes(holder);
            if usable == 0 {
                continue;
            }
            available += usable;
            prefix.push((holder.id, usable));
        }
        if available < k {
            return None;
        }

        let mut victims = Vec::with_capacity(prefix.len());
        for (id, usable) in prefix.into_iter().rev() {
            if available - usable >= k {
                available -= usable;
            } else {
                victims.push(id);
            }
        }
        victims.reverse();
        Some(victims)
    }

    /// Nodes `holder` would return to the free pool if suspended.
    fn usable_nodes(&self, holder: &Holder) -> usize {
        holder
            .nodes
            .iter()
            .filter(|name| {
                self.nodes
                    .get(*name)
                    .is_some_and(|n| n.working == Some(holder.id) && n.is_ready())
            })
            .count()
    }

    /// Suspend `victims` in favour of `by`. Returns the nodes freed.
    fn preempt(&mut self, victims: &[TaskId], by: TaskId) -> BTreeSet<NodeName> {
        let mut freed = BTreeSet::new();

        for victim in victims {
            let Some(pos) = self.holders.iter().position(|h| h.id == *victim) else {
                continue;
            };
            let holder = self.holders.remove(pos);
            freed.extend(self.release(holder.id, &holder.nodes));

            if let Some(task) = self
                .index
                .get(victim)
                .and_then(|i| self.decisions.get_mut(*i))
            {
                task.process_result = ProcessResult::Suspend;
                task.scheduler_result = SchedulerResult::CannotRun;
                task.scheduler_msg = format!("preempted by task {by}");
            }

            info!(
                group = %self.group,
                victim = %victim,
                victim_priority = holder.priority,
                preempted_by = %by,
                "Preempting lower-priority task"
            );
        }

        debug!(by = %by, freed = freed.len(), "Preemption freed nodes");
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::partitions;
    use crate::pre_assign::pre_assign;
    use crate::rules::evaluate;
    use fleet_id::GroupName;
    use fleet_model::{Snapshot, Task};
    use fleet_testing::ClusterBuilder;

    fn run(snapshot: Snapshot) -> MatchOutcome {
        let ws = pre_assign(&snapshot, &GroupName::new("default"));
        let verdicts = evaluate(&ws);
        let mut parts = partitions(&ws, &verdicts, &ws.nodes);
        assert_eq!(parts.len(), 1);
        match_training(parts.remove(0))
    }

    fn decision(outcome: &MatchOutcome, id: u64) -> &Task {
        outcome
            .tasks
            .iter()
            .find(|t| t.id == TaskId::new(id))
            .unwrap_or_else(|| panic!("task {id} not decided"))
    }

    fn nodes(task: &Task) -> Vec<&str> {
        task.assigned_nodes.iter().map(|n| n.as_str()).collect()
    }

    #[test]
    fn test_preemption_frees_nodes_for_higher_priority() {
        let outcome = run(ClusterBuilder::new()
            .group("a100")
            .nodes("n", 3, "room1")
            .user("alice", 8)
            .user("bob", 8)
            .queued(1, "alice", 50, 2)
            .scheduled(2, "bob", 20, &["n2", "n3"])
            .queued(3, "alice", 50, 1)
            .build());

        assert_eq!(decision(&outcome, 2).process_result, ProcessResult::Suspend);
        assert_eq!(decision(&outcome, 1).process_result, ProcessResult::Startup);
        assert_eq!(nodes(decision(&outcome, 1)), vec!["n2", "n3"]);
        assert_eq!(decision(&outcome, 3).process_result, ProcessResult::Startup);
        assert_eq!(nodes(decision(&outcome, 3)), vec!["n1"]);
    }

    #[test]
    fn test_equal_priority_is_never_preempted() {
        let outcome = run(ClusterBuilder::new()
            .group("a100")
            .nodes("n", 2, "room1")
            .user("alice", 8)
            .user("bob", 8)
            .scheduled(1, "bob", 30, &["n1", "n2"])
            .queued(2, "alice", 30, 1)
            .build());

        assert_eq!(decision(&outcome, 1).process_result, ProcessResult::KeepRunning);
        assert_eq!(decision(&outcome, 2).process_result, ProcessResult::NotSure);
    }

    #[test]
    fn test_no_partial_preemption_when_insufficient() {
        let outcome = run(ClusterBuilder::new()
            .group("a100")
            .nodes("n", 4, "room1")
            .user("alice", 8)
            .user("bob", 8)
            .scheduled(1, "bob", 10, &["n1"])
            .scheduled(2, "bob", 50, &["n2", "n3", "n4"])
            .queued(3, "alice", 40, 2)
            .build());

        assert_eq!(decision(&outcome, 1).process_result, ProcessResult::KeepRunning);
        assert_eq!(decision(&outcome, 3).process_result, ProcessResult::NotSure);
    }

    #[test]
    fn test_newest_placement_preempted_first() {
        let outcome = run(ClusterBuilder::new()
            .group("a100")
            .nodes("n", 2, "room1")
            .user("alice", 8)
            .user("bob", 8)
            .scheduled(1, "bob", 10, &["n1"])
            .with_last(|t| t.running_seconds = 5000)
            .scheduled(2, "bob", 10, &["n2"])
            .with_last(|t| t.running_seconds = 30)
            .queued(3, "alice", 30, 1)
            .build());

        assert_eq!(decision(&outcome, 1).process_result, ProcessResult::KeepRunning);
        assert_eq!(decision(&outcome, 2).process_result, ProcessResult::Suspend);
        assert_eq!(nodes(decision(&outcome, 3)), vec!["n2"]);
    }

    #[test]
    fn test_unneeded_victim_is_spared() {
        let outcome = run(ClusterBuilder::new()
            .group("a100")
            .nodes("n", 3, "room1")
            .user("alice", 8)
            .user("bob", 8)
            .scheduled(1, "bob", 10, &["n1"])
            .scheduled(2, "bob", 20, &["n2", "n3"])
            .queued(3, "alice", 50, 2)
            .build());

        let survivor = decision(&outcome, 1);
        assert_eq!(survivor.process_result, ProcessResult::KeepRunning);
        assert_eq!(nodes(survivor), vec!["n1"]);
        assert_eq!(decision(&outcome, 2).scheduler_msg, "preempted by task 3");
        assert_eq!(nodes(decision(&outcome, 3)), vec!["n2", "n3"]);
        assert!(outcome.nodes.iter().all(|n| n.working.is_some()));
    }

    #[test]
    fn test_invalid_snapshot_never_preempts() {
        let outcome = run(ClusterBuilder::new()
            .invalid()
            .group("a100")
            .nodes("n", 2, "room1")
            .user("alice", 8)
            .user("bob", 8)
            .scheduled(1, "bob", 10, &["n1", "n2"])
            .queued(2, "alice", 50, 1)
            .build());

        assert_eq!(decision(&outcome, 1).process_result, ProcessResult::KeepRunning);
        assert_eq!(decision(&outcome, 2).process_result, ProcessResult::NotSure);
    }

    #[test]
    fn test_big_task_does_not_block_small() {
        let outcome = run(ClusterBuilder::new()
            .group("a100")
            .nodes("n", 4, "room1")
            .user("alice", 8)
            .user("bob", 8)
            .scheduled(1, "bob", 50, &["n1", "n2"])
            .queued(2, "alice", 50, 3)
            .queued(3, "alice", 10, 1)
            .build());

        let big = decision(&outcome, 2);
        assert_eq!(big.process_result, ProcessResult::NotSure);
        assert_eq!(big.scheduler_result, SchedulerResult::CanRun);
        assert_eq!(decision(&outcome, 3).process_result, ProcessResult::Startup);
        assert_eq!(nodes(decision(&outcome, 3)), vec!["n3"]);
    }

    #[test]
    fn test_infeasible_task_reported() {
        let outcome = run(ClusterBuilder::new()
            .group("a100")
            .nodes("n", 4, "room1")
            .user("alice", 8)
            .queued(1, "alice", 50, 5)
            .build());

        let task = decision(&outcome, 1);
        assert_eq!(task.process_result, ProcessResult::NotSure);
        assert!(task.scheduler_msg.starts_with("infeasible"));
        assert_eq!(outcome.infeasible, vec![TaskId::new(1)]);
    }

    #[test]
    fn test_not_ready_nodes_are_not_allocated() {
        let mut snapshot = ClusterBuilder::new()
            .group("a100")
            .nodes("n", 2, "room1")
            .user("alice", 8)
            .queued(1, "alice", 10, 2)
            .build();
        snapshot.nodes[0].status = fleet_model::NodeStatus::NotReady;

        let outcome = run(snapshot);
        assert_eq!(decision(&outcome, 1).process_result, ProcessResult::NotSure);
        assert!(outcome.infeasible.is_empty());
    }
}
