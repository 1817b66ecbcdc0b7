//! Assignment sinks.
//!
//! A sink commits one tick's assignment atomically: either the whole
//! assignment is applied or none of it is. A failed commit leaves the
//! snapshot unprocessed so the next tick retries it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fleet_model::Assignment;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SinkError;

/// Destination for committed assignments.
#[async_trait]
pub trait ApplySink: Send + Sync {
    async fn commit(&self, assignment: &Assignment) -> Result<(), SinkError>;
}

/// Writes each assignment to `assignment-{seq}.json` in a directory.
///
/// The file is written under a temporary name and renamed into place, so a
/// reader never sees a partial assignment.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the assignment for `seq` is committed to.
    pub fn path_for(&self, seq: fleet_id::SnapshotSeq) -> PathBuf {
        self.dir.join(format!("assignment-{:020}.json", seq.value()))
    }
}

#[async_trait]
impl ApplySink for JsonFileSink {
    async fn commit(&self, assignment: &Assignment) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))?;

        let body = serde_json::to_vec_pretty(assignment)?;
        let target = self.path_for(assignment.seq);
        let staging = target.with_extension("json.tmp");

        tokio::fs::write(&staging, body)
            .await
            .map_err(io_err(&staging))?;
        tokio::fs::rename(&staging, &target)
            .await
            .map_err(io_err(&target))?;

        debug!(path = %target.display(), "Assignment committed");
        Ok(())
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SinkError {
    let path = path.to_path_buf();
    move |source| SinkError::Io { path, source }
}

/// Keeps committed assignments in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    committed: Arc<Mutex<Vec<Assignment>>>,
    failures: Arc<Mutex<usize>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` commits.
    pub async fn fail_next(&self, count: usize) {
        *self.failures.lock().await = count;
    }

    pub async fn committed(&self) -> Vec<Assignment> {
        self.committed.lock().await.clone()
    }
}

#[async_trait]
impl ApplySink for MemorySink {
    async fn commit(&self, assignment: &Assignment) -> Result<(), SinkError> {
        {
            let mut failures = self.failures.lock().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(SinkError::Rejected(format!(
                    "injected failure for seq {}",
                    assignment.seq
                )));
            }
        }
        self.committed.lock().await.push(assignment.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::orchestrator::schedule;
    use fleet_testing::ClusterBuilder;

    fn assignment(seq: u64) -> Assignment {
        let snapshot = ClusterBuilder::new()
            .seq(seq)
            .nodes("n", 2, "room1")
            .user("alice", 2)
            .queued(1, "alice", 10, 1)
            .build();
        schedule(&snapshot, &EngineConfig::default()).assignment
    }

    #[tokio::test]
    async fn test_file_sink_writes_named_by_seq() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("out"));
        let assignment = assignment(42);

        sink.commit(&assignment).await.unwrap();

        let path = sink.path_for(assignment.seq);
        assert!(path.ends_with("assignment-00000000000000000042.json"));
        let body = std::fs::read(&path).unwrap();
        let decoded: Assignment = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded, assignment);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_memory_sink_failure_injection() {
        let sink = MemorySink::new();
        sink.fail_next(1).await;

        let first = sink.commit(&assignment(1)).await;
        assert!(matches!(first, Err(SinkError::Rejected(_))));
        sink.commit(&assignment(1)).await.unwrap();
        assert_eq!(sink.committed().await.len(), 1);
    }
}
