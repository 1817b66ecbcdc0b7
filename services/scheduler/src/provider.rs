//! Snapshot providers.
//!
//! A provider hands the tick loop a consistent view of the cluster: nodes,
//! tasks and users from the same generation. Two implementations ship:
//!
//! - [`FileSnapshotProvider`] reads `nodes.json`, `tasks.json` and
//!   `users.json` from a directory, each a serialized [`SnapshotPart`]
//! - [`MemorySnapshotProvider`] holds a snapshot in memory for tests and
//!   replay

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fleet_id::SnapshotSeq;
use fleet_model::{Snapshot, SnapshotPart};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ProviderError;

/// Source of cluster snapshots.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// The most recent complete snapshot.
    async fn latest(&self) -> Result<Snapshot, ProviderError>;

    /// Sequence number of the newest data available, if any.
    ///
    /// Cheaper than [`latest`](Self::latest); used to detect that a tick's
    /// input went stale while it was being matched.
    async fn latest_seq(&self) -> Result<Option<SnapshotSeq>, ProviderError>;
}

const NODES_FILE: &str = "nodes.json";
const TASKS_FILE: &str = "tasks.json";
const USERS_FILE: &str = "users.json";

/// Reads snapshot parts from JSON files in one directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotProvider {
    dir: PathBuf,
}

#[derive(Deserialize)]
struct SeqOnly {
    seq: SnapshotSeq,
}

impl FileSnapshotProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `snapshot` as three part files.
    ///
    /// Each part is staged under a temporary name and renamed into place, so
    /// a concurrent reader sees either the old part or the new one.
    pub async fn publish(&self, snapshot: Snapshot) -> Result<(), ProviderError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ProviderError::Io {
                path: self.dir.clone(),
                source,
            })?;
        let (nodes, tasks, users) = snapshot.into_parts();
        self.write_part(NODES_FILE, &nodes).await?;
        self.write_part(TASKS_FILE, &tasks).await?;
        self.write_part(USERS_FILE, &users).await
    }

    async fn write_part<T: serde::Serialize>(
        &self,
        file: &str,
        part: &SnapshotPart<T>,
    ) -> Result<(), ProviderError> {
        let path = self.dir.join(file);
        let body = serde_json::to_vec_pretty(part).map_err(|source| ProviderError::Decode {
            path: path.clone(),
            source,
        })?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, body)
            .await
            .map_err(|source| ProviderError::Io {
                path: staging.clone(),
                source,
            })?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|source| ProviderError::Io { path, source })
    }

    /// Read a file, or `None` if it does not exist yet.
    async fn read(&self, file: &'static str) -> Result<Option<Vec<u8>>, ProviderError> {
        let path = self.dir.join(file);
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ProviderError::Io { path, source }),
        }
    }

    async fn read_part<T: DeserializeOwned>(
        &self,
        file: &'static str,
    ) -> Result<SnapshotPart<T>, ProviderError> {
        let body = self
            .read(file)
            .await?
            .ok_or(ProviderError::Incomplete { part: file })?;
        serde_json::from_slice(&body).map_err(|source| ProviderError::Decode {
            path: self.dir.join(file),
            source,
        })
    }

    async fn read_seq(&self, file: &'static str) -> Result<Option<SnapshotSeq>, ProviderError> {
        let Some(body) = self.read(file).await? else {
            return Ok(None);
        };
        let header: SeqOnly =
            serde_json::from_slice(&body).map_err(|source| ProviderError::Decode {
                path: self.dir.join(file),
                source,
            })?;
        Ok(Some(header.seq))
    }
}

#[async_trait]
impl SnapshotProvider for FileSnapshotProvider {
    async fn latest(&self) -> Result<Snapshot, ProviderError> {
        let nodes = self.read_part(NODES_FILE).await?;
        let tasks = self.read_part(TASKS_FILE).await?;
        let users = self.read_part(USERS_FILE).await?;

        let snapshot = Snapshot::assemble(nodes, tasks, users).map_err(ProviderError::TornRead)?;
        debug!(
            seq = %snapshot.seq,
            nodes = snapshot.nodes.len(),
            tasks = snapshot.tasks.len(),
            users = snapshot.users.len(),
            "Loaded snapshot"
        );
        Ok(snapshot)
    }

    async fn latest_seq(&self) -> Result<Option<SnapshotSeq>, ProviderError> {
        let mut newest = None;
        for file in [NODES_FILE, TASKS_FILE, USERS_FILE] {
            newest = newest.max(self.read_seq(file).await?);
        }
        Ok(newest)
    }
}

/// In-memory provider; `publish` replaces the current snapshot.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotProvider {
    current: Arc<RwLock<Option<Snapshot>>>,
}

impl MemorySnapshotProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Some(snapshot))),
        }
    }

    pub async fn publish(&self, snapshot: Snapshot) {
        *self.current.write().await = Some(snapshot);
    }
}

#[async_trait]
impl SnapshotProvider for MemorySnapshotProvider {
    async fn latest(&self) -> Result<Snapshot, ProviderError> {
        self.current
            .read()
            .await
            .clone()
            .ok_or(ProviderError::Incomplete { part: "snapshot" })
    }

    async fn latest_seq(&self) -> Result<Option<SnapshotSeq>, ProviderError> {
        Ok(self.current.read().await.as_ref().map(|s| s.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_testing::ClusterBuilder;

    #[tokio::test]
    async fn test_file_roundtrip_assembles_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path());
        let snapshot = ClusterBuilder::new()
            .seq(7)
            .nodes("n", 2, "room1")
            .user("alice", 2)
            .queued(1, "alice", 10, 1)
            .build();

        provider.publish(snapshot).await.unwrap();
        let loaded = provider.latest().await.unwrap();
        assert_eq!(loaded.seq, SnapshotSeq::new(7));
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.tasks.len(), 1);
        assert_eq!(provider.latest_seq().await.unwrap(), Some(SnapshotSeq::new(7)));
    }

    #[tokio::test]
    async fn test_missing_part_is_incomplete() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path());
        provider
            .publish(ClusterBuilder::new().build())
            .await
            .unwrap();
        std::fs::remove_file(dir.path().join(USERS_FILE)).unwrap();

        let err = provider.latest().await.unwrap_err();
        assert!(matches!(err, ProviderError::Incomplete { part: "users.json" }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_mixed_generations_are_torn() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path());
        provider
            .publish(ClusterBuilder::new().seq(1).build())
            .await
            .unwrap();

        let (nodes, _, _) = ClusterBuilder::new().seq(2).build().into_parts();
        provider.write_part(NODES_FILE, &nodes).await.unwrap();

        let err = provider.latest().await.unwrap_err();
        assert!(matches!(err, ProviderError::TornRead(_)));
        assert_eq!(provider.latest_seq().await.unwrap(), Some(SnapshotSeq::new(2)));
    }

    #[tokio::test]
    async fn test_corrupt_part_is_not_transient() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path());
        provider
            .publish(ClusterBuilder::new().build())
            .await
            .unwrap();
        std::fs::write(dir.path().join(TASKS_FILE), b"{not json").unwrap();

        let err = provider.latest().await.unwrap_err();
        assert!(matches!(err, ProviderError::Decode { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reader_never_sees_partial_part_during_publish() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSnapshotProvider::new(dir.path());
        let cluster = |seq: u64| {
            ClusterBuilder::new()
                .seq(seq)
                .nodes("n", 64, "room1")
                .user("alice", 8)
                .queued(1, "alice", 10, 1)
                .build()
        };
        provider.publish(cluster(1)).await.unwrap();

        let writer = {
            let provider = provider.clone();
            tokio::spawn(async move {
                for seq in 2..=40 {
                    provider.publish(cluster(seq)).await.unwrap();
                }
            })
        };

        while !writer.is_finished() {
            if let Err(e) = provider.latest().await {
                assert!(e.is_transient(), "unexpected read error: {e}");
            }
        }
        writer.await.unwrap();

        assert_eq!(provider.latest().await.unwrap().seq, SnapshotSeq::new(40));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_memory_provider_publish_replaces() {
        let provider = MemorySnapshotProvider::new();
        assert!(provider.latest().await.is_err());
        assert_eq!(provider.latest_seq().await.unwrap(), None);

        provider.publish(ClusterBuilder::new().seq(4).build()).await;
        assert_eq!(provider.latest().await.unwrap().seq, SnapshotSeq::new(4));
    }
}
