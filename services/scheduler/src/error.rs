//! Error types for the scheduler and its collaborator seams.

use std::path::PathBuf;

use fleet_model::ModelError;
use thiserror::Error;

/// Result type for tick operations.
pub type TickResult<T> = Result<T, SchedulerError>;

/// Errors that fail a whole tick.
///
/// None of these stop the tick loop; the next tick retries.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("snapshot provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("apply sink error: {0}")]
    Sink(#[from] SinkError),

    /// A fan-out partition panicked or was cancelled.
    #[error("matcher worker failed: {0}")]
    Worker(String),
}

/// Errors raised while reading a snapshot.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// One of the three collections is not available yet.
    #[error("snapshot incomplete: {part} not available")]
    Incomplete { part: &'static str },

    /// The collections were delivered from different generations.
    #[error("{0}")]
    TornRead(#[source] ModelError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ProviderError {
    /// Returns true if retrying later may succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Incomplete { .. } | Self::TornRead(_))
    }
}

/// Errors raised while committing an assignment.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode assignment: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("commit rejected: {0}")]
    Rejected(String),
}

/// Errors raised by the remote-execution collaborator.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_id::SnapshotSeq;

    #[test]
    fn test_transient_provider_errors() {
        assert!(ProviderError::Incomplete { part: "users" }.is_transient());

        let torn = ProviderError::TornRead(ModelError::TornRead {
            nodes: SnapshotSeq::new(1),
            tasks: SnapshotSeq::new(2),
            users: SnapshotSeq::new(1),
        });
        assert!(torn.is_transient());
        assert_eq!(
            torn.to_string(),
            "torn snapshot read: nodes@1, tasks@2, users@1"
        );

        let io = ProviderError::Io {
            path: PathBuf::from("/tmp/nodes.json"),
            source: std::io::Error::other("denied"),
        };
        assert!(!io.is_transient());
    }
}
