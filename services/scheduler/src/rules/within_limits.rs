//! Quota admission.

use std::collections::BTreeMap;

use fleet_id::{GroupName, UserName};
use fleet_model::PriorityTier;

use super::{Denial, PartitionSizes, RuleVerdict};
use crate::pre_assign::{PreparedTask, WorkingSet};

/// Which chain heads a quota walk covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WalkScope {
    /// Scheduled heads only: what the current holders are entitled to.
    Scheduled,
    /// Scheduled heads first, then queued heads.
    All,
}

/// Admit chain heads against quota, per (user, group, tier).
///
/// Scheduled heads are walked before queued ones so running work keeps its
/// reservation. Within each part the order is priority desc, custom rank
/// desc (unranked last), then id asc. A task is approved while
/// `held + nodes <= ceiling`, where the ceiling is the resolved quota capped
/// by the user's visible nodes and by `n`. A denied task does not block
/// smaller ones behind it.
pub fn within_limits(ws: &WorkingSet, n: &PartitionSizes) -> RuleVerdict {
    quota_walk(ws, n, WalkScope::All)
}

pub(super) fn quota_walk(ws: &WorkingSet, n: &PartitionSizes, scope: WalkScope) -> RuleVerdict {
    let mut verdict = RuleVerdict::default();
    let mut buckets: BTreeMap<(&UserName, &GroupName, PriorityTier), Vec<&PreparedTask>> =
        BTreeMap::new();

    for prepared in &ws.tasks {
        let task = &prepared.task;
        let in_scope = match scope {
            WalkScope::Scheduled => task.is_scheduled(),
            WalkScope::All => task.is_scheduled() || task.is_queued(),
        };
        if !in_scope || !prepared.is_chain_head {
            continue;
        }
        if !ws.users.contains_key(&task.user_name) {
            verdict.deny(task.id, Denial::UnknownUser);
            continue;
        }
        buckets
            .entry((&task.user_name, &task.group, prepared.tier))
            .or_default()
            .push(prepared);
    }

    for ((user_name, group, tier), mut tasks) in buckets {
        let Some(view) = ws.users.get(user_name) else {
            continue;
        };

        let quota = view.quota.ceiling(group, tier);
        let visible = u32::try_from(view.visible_in(group)).unwrap_or(u32::MAX);
        let partition = u32::try_from(n.get(group).copied().unwrap_or(0)).unwrap_or(u32::MAX);
        let ceiling = quota.min(visible).min(partition);

        tasks.sort_by(|a, b| {
            b.task
                .is_scheduled()
                .cmp(&a.task.is_scheduled())
                .then_with(|| a.rank_cmp(b))
                .then_with(|| a.task.id.cmp(&b.task.id))
        });

        let mut held: u32 = 0;
        for prepared in tasks {
            let requested = prepared.task.nodes;
            let after = held.saturating_add(requested);
            if after <= ceiling {
                held = after;
                verdict.approve(prepared.task.id);
            } else {
                verdict.deny(
                    prepared.task.id,
                    Denial::OverQuota {
                        held,
                        requested,
                        ceiling,
                    },
                );
            }
        }
    }

    verdict
}
