//! Node selection.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use fleet_id::NodeName;
use fleet_model::Node;

/// Pick `k` nodes from `free`, preferring a single room.
///
/// The chosen room is one that can supply all `k` nodes: rooms holding a
/// `preferred` node first, then the smallest such room, then by room name.
/// Inside the room, preferred nodes come first, then spine, leaf and name.
/// When no room is large enough the whole free pool is used, ordered the
/// same way with room ahead of spine.
///
/// Returns `None` only when fewer than `k` nodes are free.
pub fn select_nodes(
    free: &[&Node],
    preferred: &BTreeSet<NodeName>,
    k: usize,
) -> Option<Vec<NodeName>> {
    if free.len() < k {
        return None;
    }

    let mut rooms: BTreeMap<&str, Vec<&Node>> = BTreeMap::new();
    for node in free.iter().copied() {
        rooms.entry(node.room.as_str()).or_default().push(node);
    }

    let room_key = |nodes: &[&Node]| -> (bool, usize) {
        let has_preferred = nodes.iter().any(|n| preferred.contains(&n.name));
        (!has_preferred, nodes.len())
    };

    let best = rooms
        .iter()
        .filter(|(_, nodes)| nodes.len() >= k)
        .min_by(|(a_room, a), (b_room, b)| {
            room_key(a.as_slice())
                .cmp(&room_key(b.as_slice()))
                .then_with(|| a_room.cmp(b_room))
        });

    let mut chosen: Vec<&Node> = match best {
        Some((_, nodes)) => {
            let mut nodes = nodes.clone();
            nodes.sort_by(|a, b| in_room_order(a, b, preferred));
            nodes
        }
        None => {
            let mut nodes = free.to_vec();
            nodes.sort_by(|a, b| {
                preferred_first(a, b, preferred)
                    .then_with(|| a.room.cmp(&b.room))
                    .then_with(|| in_room_order(a, b, preferred))
            });
            nodes
        }
    };

    chosen.truncate(k);
    Some(chosen.into_iter().map(|n| n.name.clone()).collect())
}

/// Pick the first `k` free nodes by name.
pub fn select_by_name(free: &[&Node], k: usize) -> Option<Vec<NodeName>> {
    if free.len() < k {
        return None;
    }
    let mut names: Vec<&NodeName> = free.iter().map(|n| &n.name).collect();
    names.sort();
    Some(names.into_iter().take(k).cloned().collect())
}

fn preferred_first(a: &Node, b: &Node, preferred: &BTreeSet<NodeName>) -> Ordering {
    preferred
        .contains(&b.name)
        .cmp(&preferred.contains(&a.name))
}

fn in_room_order(a: &Node, b: &Node, preferred: &BTreeSet<NodeName>) -> Ordering {
    preferred_first(a, b, preferred)
        .then_with(|| a.spine.cmp(&b.spine))
        .then_with(|| a.leaf.cmp(&b.leaf))
        .then_with(|| a.name.cmp(&b.name))
}
