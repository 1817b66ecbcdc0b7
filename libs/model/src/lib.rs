//! # fleet-model
//!
//! Record types exchanged between the scheduler and its collaborators.
//!
//! ## Design Principles
//!
//! - A snapshot is an immutable, point-in-time view of nodes, tasks and users
//! - Snapshot parts delivered with different sequence numbers never combine
//! - The scheduler's output is an [`Assignment`]: decisions plus the node
//!   frame they imply, committed all-or-nothing by the sink
//! - Intents are derived from a committed assignment and are the only thing
//!   the remote-execution collaborator sees
//!
//! ## Records
//!
//! - [`Node`]: one row per machine, with locality tags and occupancy
//! - [`Task`]: one row per attempt of a chain
//! - [`User`]: role, inherited quota owners and the raw quota table

mod assignment;
mod error;
mod intent;
mod node;
mod priority;
mod snapshot;
mod task;
mod user;

pub use assignment::{Assignment, SCHEDULER_ACTOR};
pub use error::ModelError;
pub use intent::{Intent, IntentBatch, IntentKind};
pub use node::{Node, NodeStatus};
pub use priority::{PriorityTier, AUTO_PRIORITY};
pub use snapshot::{Snapshot, SnapshotPart};
pub use task::{ProcessResult, QueueStatus, SchedulerResult, Task, TaskType};
pub use user::{User, UserRole};
