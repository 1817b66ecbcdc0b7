//! Continued entitlement of scheduled tasks.

use super::within_limits::{quota_walk, WalkScope};
use super::{Denial, PartitionSizes, RuleVerdict};
use crate::pre_assign::WorkingSet;

/// Decide which scheduled tasks keep their nodes.
///
/// A scheduled task keeps running unless a newer attempt of its chain
/// exists, another scheduled task already holds one of its nodes, or its quota was reduced so far that the scheduled tasks alone no
/// longer fit and this one falls outside the ceiling.
pub fn running(ws: &WorkingSet, n: &PartitionSizes) -> RuleVerdict {
    let heads = ws.chain_heads();
    let entitled = quota_walk(ws, n, WalkScope::Scheduled);
    let mut verdict = RuleVerdict::default();

    for prepared in ws.tasks.iter().filter(|t| t.task.is_scheduled()) {
        let id = prepared.task.id;

        if !prepared.is_chain_head {
            if let Some(head) = heads.get(&prepared.task.chain_id) {
                verdict.deny(id, Denial::Superseded { by: *head });
                continue;
            }
        }

        if let Some(conflict) = ws.conflicts.get(&id) {
            verdict.deny(
                id,
                Denial::DoubleBooked {
                    node: conflict.node.clone(),
                    holder: conflict.holder,
                },
            );
            continue;
        }

        match entitled.check(id) {
            Ok(()) => verdict.approve(id),
            Err(Denial::OverQuota {
                held,
                requested,
                ceiling,
            }) => verdict.deny(
                id,
                Denial::QuotaTightened {
                    held,
                    requested,
                    ceiling,
                },
            ),
            Err(other) => verdict.deny(id, other),
        }
    }

    verdict
}
