//! Validation matcher.
//!
//! Validation tasks are short health checks. They are matched before training work
//! and only ever consume nodes that are already free: no locality
//! preference beyond name order and no preemption.

use tracing::instrument;

use super::placement::select_by_name;
use super::{Candidate, MatchOutcome, MatchState, Partition};

/// Match one group's validation tasks.
#[instrument(skip(partition), fields(group = %partition.group, candidates = partition.candidates.len()))]
pub fn match_validation(partition: Partition) -> MatchOutcome {
    let Partition {
        group,
        nodes,
        candidates,
        ..
    } = partition;
    let mut state = MatchState::new(group, nodes);

    let (running, waiting): (Vec<Candidate>, Vec<Candidate>) = candidates
        .into_iter()
        .filter(|c| c.task.task.is_validation())
        .filter(|c| c.task.task.is_scheduled() || (c.task.task.is_queued() && c.task.is_chain_head))
        .partition(|c| c.task.task.is_scheduled());

    for candidate in running {
        match &candidate.verdict.running {
            Ok(()) => state.keep(candidate.task, false),
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
        match select_by_name(&state.free_nodes(), k) {
            Some(chosen) => state.start(candidate.task.task, chosen),
            None => state.wait(candidate.task.task),
        }
    }

    state.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Denial, TaskVerdict};
    use crate::pre_assign::PreparedTask;
    use fleet_id::{GroupName, NodeName, TaskId};
    use fleet_model::{PriorityTier, ProcessResult, QueueStatus, TaskType};
    use fleet_testing::{task, ClusterBuilder};

    fn candidate(id: u64, priority: i32, nodes: u32, status: QueueStatus) -> Candidate {
        let mut task = task(id, "alice", "a100", priority, nodes);
        task.task_type = TaskType::Validation;
        task.queue_status = status;
        Candidate {
            task: PreparedTask {
                task,
                effective_priority: priority,
                tier: PriorityTier::from_value(priority),
                is_chain_head: true,
            },
            verdict: TaskVerdict {
                within_limits: Ok(()),
                running: Ok(()),
                waiting_init: Ok(()),
            },
        }
    }

    fn partition(candidates: Vec<Candidate>) -> Partition {
        let snapshot = ClusterBuilder::new()
            .group("a100")
            .nodes("n", 3, "room1")
            .build();
        Partition {
            group: GroupName::new("a100"),
            valid: true,
            nodes: snapshot.nodes,
            candidates,
        }
    }

    #[test]
    fn test_takes_free_nodes_by_name() {
        let outcome = match_validation(partition(vec![
            candidate(1, 10, 2, QueueStatus::Queued),
            candidate(2, 50, 1, QueueStatus::Queued),
        ]));

        let by_id = |id: u64| outcome.tasks.iter().find(|t| t.id == TaskId::new(id));
        assert_eq!(by_id(2).map(|t| t.assigned_nodes.clone()), Some(vec![NodeName::new("n1")]));
        assert_eq!(
            by_id(1).map(|t| t.assigned_nodes.clone()),
            Some(vec![NodeName::new("n2"), NodeName::new("n3")])
        );
    }

    #[test]
    fn test_never_preempts() {
        let mut running = candidate(1, 10, 3, QueueStatus::Scheduled);
        running.task.task.assigned_nodes =
            vec![NodeName::new("n1"), NodeName::new("n2"), NodeName::new("n3")];
        let mut part = partition(vec![running, candidate(2, 50, 1, QueueStatus::Queued)]);
        for node in &mut part.nodes {
            node.working = Some(TaskId::new(1));
        }

        let outcome = match_validation(part);
        assert_eq!(outcome.tasks[0].process_result, ProcessResult::KeepRunning);
        assert_eq!(outcome.tasks[1].process_result, ProcessResult::NotSure);
    }

    #[test]
    fn test_failed_running_verdict_frees_nodes() {
        let mut running = candidate(1, 10, 1, QueueStatus::Scheduled);
        running.task.task.assigned_nodes = vec![NodeName::new("n1")];
        running.verdict.running = Err(Denial::UnknownUser);
        let mut part = partition(vec![running]);
        part.nodes[0].working = Some(TaskId::new(1));

        let outcome = match_validation(part);
        assert_eq!(outcome.tasks[0].process_result, ProcessResult::Suspend);
        assert!(outcome.nodes.iter().all(|n| n.working.is_none()));
    }

    #[test]
    fn test_training_tasks_are_ignored() {
        let mut training = candidate(1, 10, 1, QueueStatus::Queued);
        training.task.task.task_type = TaskType::Training;
        let outcome = match_validation(partition(vec![training]));
        assert!(outcome.tasks.is_empty());
    }
}
