//! First-start eligibility of queued tasks.

use std::collections::BTreeMap;

use fleet_id::{ChainId, TaskId};

use super::{Denial, PartitionSizes, RuleVerdict};
use crate::pre_assign::WorkingSet;

/// Decide which queued tasks may attempt a start.
///
/// Only the chain head of a known user requesting at least one node is
/// eligible, and only while no other attempt of its chain is scheduled.
/// Other chains' outcomes are never consulted.
pub fn waiting_init(ws: &WorkingSet, _n: &PartitionSizes) -> RuleVerdict {
    let running: BTreeMap<&ChainId, TaskId> = ws
        .tasks
        .iter()
        .filter(|t| t.task.is_scheduled())
        .map(|t| (&t.task.chain_id, t.task.id))
        .collect();

    let mut verdict = RuleVerdict::default();
    for prepared in ws.tasks.iter().filter(|t| t.task.is_queued()) {
        let task = &prepared.task;

        let denial = if !prepared.is_chain_head {
            Some(Denial::NotChainHead)
        } else if !ws.users.contains_key(&task.user_name) {
            Some(Denial::UnknownUser)
        } else if task.nodes == 0 {
            Some(Denial::NoNodesRequested)
        } else {
            running
                .get(&task.chain_id)
                .map(|running| Denial::ChainAlreadyRunning { running: *running })
        };

        match denial {
            Some(denial) => verdict.deny(task.id, denial),
            None => verdict.approve(task.id),
        }
    }

    verdict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pre_assign::pre_assign;
    use fleet_id::GroupName;
    use fleet_testing::ClusterBuilder;
    use rstest::rstest;

    fn check(builder: ClusterBuilder, id: u64) -> Result<(), Denial> {
        let ws = pre_assign(&builder.build(), &GroupName::new("default"));
        waiting_init(&ws, &ws.group_sizes).check(TaskId::new(id))
    }

    fn base() -> ClusterBuilder {
        ClusterBuilder::new()
            .group("a100")
            .nodes("n", 2, "room1")
            .user("alice", 2)
    }

    #[rstest]
    #[case::eligible(base().queued(1, "alice", 10, 1), 1, Ok(()))]
    #[case::unknown_user(base().queued(1, "bob", 10, 1), 1, Err(Denial::UnknownUser))]
    #[case::no_nodes(base().queued(1, "alice", 10, 0), 1, Err(Denial::NoNodesRequested))]
    #[case::dormant_attempt(
        base()
            .queued(1, "alice", 10, 1)
            .queued(2, "alice", 10, 1)
            .with_last(|t| t.chain_id = ChainId::new("chain-1")),
        1,
        Err(Denial::NotChainHead)
    )]
    #[case::chain_running(
        base()
            .scheduled(1, "alice", 10, &["n1"])
            .queued(2, "alice", 10, 1)
            .with_last(|t| t.chain_id = ChainId::new("chain-1")),
        2,
        Err(Denial::ChainAlreadyRunning { running: TaskId::new(1) })
    )]
    fn test_waiting_init(
        #[case] builder: ClusterBuilder,
        #[case] id: u64,
        #[case] expected: Result<(), Denial>,
    ) {
        assert_eq!(check(builder, id), expected);
    }
}
