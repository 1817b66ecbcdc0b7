//! Point-in-time cluster state consumed by one tick.

use chrono::{DateTime, Utc};
use fleet_id::SnapshotSeq;
use serde::{Deserialize, Serialize};

use crate::{ModelError, Node, Task, User};

/// One of the three collections that make up a snapshot, as delivered by the
/// provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPart<T> {
    pub seq: SnapshotSeq,

    /// False when the upstream data is known to be stale.
    #[serde(default = "default_valid")]
    pub valid: bool,

    pub taken_at: DateTime<Utc>,

    pub records: Vec<T>,
}

fn default_valid() -> bool {
    true
}

impl<T> SnapshotPart<T> {
    pub fn new(seq: SnapshotSeq, taken_at: DateTime<Utc>, records: Vec<T>) -> Self {
        Self {
            seq,
            valid: true,
            taken_at,
            records,
        }
    }
}

/// Immutable per-tick input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub seq: SnapshotSeq,

    /// When false, the matcher observes only and never preempts.
    pub valid: bool,

    pub taken_at: DateTime<Utc>,

    pub nodes: Vec<Node>,

    pub tasks: Vec<Task>,

    pub users: Vec<User>,
}

impl Snapshot {
    /// Combine three parts into a snapshot.
    ///
    /// All parts must carry the same sequence number. The snapshot is valid
    /// only if every part is valid, and is dated by its oldest part.
    pub fn assemble(
        nodes: SnapshotPart<Node>,
        tasks: SnapshotPart<Task>,
        users: SnapshotPart<User>,
    ) -> Result<Self, ModelError> {
        if nodes.seq != tasks.seq || nodes.seq != users.seq {
            return Err(ModelError::TornRead {
                nodes: nodes.seq,
                tasks: tasks.seq,
                users: users.seq,
            });
        }

        let taken_at = nodes.taken_at.min(tasks.taken_at).min(users.taken_at);

        Ok(Self {
            seq: nodes.seq,
            valid: nodes.valid && tasks.valid && users.valid,
            taken_at,
            nodes: nodes.records,
            tasks: tasks.records,
            users: users.records,
        })
    }

    /// Split into the three delivered parts.
    pub fn into_parts(self) -> (SnapshotPart<Node>, SnapshotPart<Task>, SnapshotPart<User>) {
        let Snapshot {
            seq,
            valid,
            taken_at,
            nodes,
            tasks,
            users,
        } = self;
        (
            SnapshotPart {
                seq,
                valid,
                taken_at,
                records: nodes,
            },
            SnapshotPart {
                seq,
                valid,
                taken_at,
                records: tasks,
            },
            SnapshotPart {
                seq,
                valid,
                taken_at,
                records: users,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_part<T>(seq: u64) -> SnapshotPart<T> {
        SnapshotPart::new(SnapshotSeq::new(seq), Utc::now(), Vec::new())
    }

    #[test]
    fn test_assemble_same_generation() {
        let mut tasks = empty_part(3);
        tasks.valid = false;
        let snapshot = Snapshot::assemble(empty_part(3), tasks, empty_part(3)).unwrap();
        assert_eq!(snapshot.seq, SnapshotSeq::new(3));
        assert!(!snapshot.valid);
    }

    #[test]
    fn test_assemble_rejects_torn_read() {
        let result = Snapshot::assemble(empty_part(3), empty_part(4), empty_part(3));
        assert!(matches!(result, Err(ModelError::TornRead { .. })));
    }
}
