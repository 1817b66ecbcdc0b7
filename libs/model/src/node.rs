//! Node records.

use fleet_id::{GroupName, NodeName, TaskId};
use serde::{Deserialize, Serialize};

/// Readiness reported by inventory collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Ready,
    NotReady,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One physical or logical machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node name.
    pub name: NodeName,

    #[serde(default)]
    pub gpu_count: u32,

    #[serde(default)]
    pub cpu_count: u32,

    #[serde(default)]
    pub memory_gb: u64,

    /// Current partition label.
    #[serde(default)]
    pub group: GroupName,

    /// Home partition label.
    #[serde(default)]
    pub origin_group: GroupName,

    #[serde(default)]
    pub status: NodeStatus,

    /// Task currently occupying the node.
    #[serde(default)]
    pub working: Option<TaskId>,

    #[serde(default)]
    pub room: String,

    #[serde(default)]
    pub leaf: String,

    #[serde(default)]
    pub spine: String,

    /// Inactive nodes are invisible to the scheduler.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Node {
    /// Returns true if no task occupies the node.
    pub fn is_free(&self) -> bool {
        self.working.is_none()
    }

    /// Returns true if the node may receive new work.
    pub fn is_ready(&self) -> bool {
        self.active && self.status == NodeStatus::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_defaults_from_sparse_json() {
        let node: Node = serde_json::from_str(r#"{"name": "n1", "status": "Ready"}"#).unwrap();
        assert!(node.active);
        assert!(node.is_free());
        assert!(node.is_ready());
        assert!(node.group.is_empty());
    }

    #[test]
    fn test_unrecognized_status_is_unknown() {
        let node: Node =
            serde_json::from_str(r#"{"name": "n1", "status": "Cordoned"}"#).unwrap();
        assert_eq!(node.status, NodeStatus::Unknown);
        assert!(!node.is_ready());
    }
}
