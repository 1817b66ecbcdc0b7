//! Error types for model assembly and serialization.

use fleet_id::SnapshotSeq;
use thiserror::Error;

/// Errors that can occur when assembling or decoding model records.
#[derive(Debug, Error, Clone)]
pub enum ModelError {
    /// Snapshot parts come from different generations.
    #[error("torn snapshot read: nodes@{nodes}, tasks@{tasks}, users@{users}")]
    TornRead {
        nodes: SnapshotSeq,
        tasks: SnapshotSeq,
        users: SnapshotSeq,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}
