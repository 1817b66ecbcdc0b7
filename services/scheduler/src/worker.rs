//! Tick loop.
//!
//! The worker wakes once per tick interval and:
//! 1. Reads the latest snapshot from the provider
//! 2. Skips it if that sequence number was already committed
//! 3. Runs the tick pipeline
//! 4. Discards the result if a newer snapshot arrived meanwhile
//! 5. Commits the assignment, then advances the checkpoint
//! 6. Dispatches intents for the committed assignment
//!
//! Ticks never overlap: a slow tick delays the next one rather than racing it.

use std::sync::Arc;
use std::time::Duration;

use fleet_id::SnapshotSeq;
use fleet_model::ProcessResult;
use fleet_reconcile::{SlaWindow, SnapshotCheckpoint, DEFAULT_TICK_INTERVAL};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{Config, EngineConfig};
use crate::dispatch::IntentDispatcher;
use crate::error::{SinkError, TickResult};
use crate::health::{TickHealth, TickMetrics};
use crate::orchestrator::{digest, run_tick};
use crate::provider::SnapshotProvider;
use crate::sink::ApplySink;

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No complete snapshot was available.
    Idle,

    /// The snapshot was already committed.
    Skipped { seq: SnapshotSeq },

    /// A newer snapshot arrived while matching; nothing was committed.
    Discarded { seq: SnapshotSeq, newer: SnapshotSeq },

    Committed {
        seq: SnapshotSeq,
        metrics: TickMetrics,
    },
}

/// Drives the tick pipeline against its collaborators.
pub struct SchedulerWorker {
    provider: Arc<dyn SnapshotProvider>,
    sink: Arc<dyn ApplySink>,
    dispatcher: Arc<dyn IntentDispatcher>,
    engine: EngineConfig,
    interval: Duration,
    checkpoint: SnapshotCheckpoint,
    health: TickHealth,
}

impl SchedulerWorker {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        sink: Arc<dyn ApplySink>,
        dispatcher: Arc<dyn IntentDispatcher>,
        engine: EngineConfig,
    ) -> Self {
        Self {
            provider,
            sink,
            dispatcher,
            engine,
            interval: DEFAULT_TICK_INTERVAL,
            checkpoint: SnapshotCheckpoint::new(),
            health: TickHealth::default(),
        }
    }

    /// Apply tick cadence and SLA settings from service configuration.
    pub fn configure(mut self, config: &Config) -> Self {
        self.engine = config.engine.clone();
        self.interval = config.tick_interval;
        self.health = TickHealth::new(SlaWindow::new(config.sla, config.sla_window));
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn checkpoint(&self) -> &SnapshotCheckpoint {
        &self.checkpoint
    }

    pub fn health(&self) -> &TickHealth {
        &self.health
    }

    /// Run ticks until the shutdown signal is received.
    #[instrument(skip(self, shutdown), name = "scheduler_worker")]
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            default_group = %self.engine.default_group,
            dry_run = self.engine.dry_run,
            "Starting tick loop"
        );

        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0u32;

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    match self.tick().await {
                        Ok(outcome) => {
                            consecutive_failures = 0;
                            debug!(?outcome, "Tick finished");
                        }
                        Err(e) => {
                            consecutive_failures += 1;
                            if consecutive_failures <= 3 {
                                warn!(error = %e, consecutive_failures, "Tick failed");
                            } else {
                                error!(error = %e, consecutive_failures, "Tick failed repeatedly");
                            }
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(
                            last_seq = ?self.checkpoint.last_seq,
                            sla_ticks = self.health.sla_ticks(),
                            "Tick loop shutting down"
                        );
                        break;
                    }
                }
            }
        }
    }

    /// Run a single tick.
    pub async fn tick(&mut self) -> TickResult<TickOutcome> {
        let snapshot = match self.provider.latest().await {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_transient() => {
                debug!(error = %e, "No complete snapshot available");
                return Ok(TickOutcome::Idle);
            }
            Err(e) => return Err(e.into()),
        };

        let seq = snapshot.seq;
        if self.checkpoint.is_processed(seq) {
            debug!(seq = %seq, "Snapshot already committed");
            return Ok(TickOutcome::Skipped { seq });
        }

        let output = run_tick(&snapshot, &self.engine).await?;
        let assignment = output.assignment;
        let metrics = self.health.record(
            seq,
            snapshot.taken_at,
            assignment.decided_at,
            output.timings.matching(),
        );

        if let Some(newer) = self.provider.latest_seq().await? {
            if newer > seq {
                info!(seq = %seq, newer = %newer, "Newer snapshot arrived; discarding tick");
                return Ok(TickOutcome::Discarded { seq, newer });
            }
        }

        let digest = digest(&assignment).map_err(SinkError::from)?;
        self.sink.commit(&assignment).await?;
        self.checkpoint.advance(seq);

        let batch = assignment.intents();
        if let Err(e) = self.dispatcher.dispatch(&batch).await {
            warn!(seq = %seq, error = %e, "Intent dispatch failed");
        }

        info!(
            seq = %seq,
            valid = assignment.valid,
            startup = assignment.count(ProcessResult::Startup),
            suspend = assignment.count(ProcessResult::Suspend),
            keep_running = assignment.count(ProcessResult::KeepRunning),
            not_sure = assignment.count(ProcessResult::NotSure),
            infeasible = assignment.infeasible.len(),
            collisions = assignment.collisions,
            inactive_nodes = output.stats.inactive_nodes,
            quota_rejected = output.stats.quota.rejected(),
            decision_ms = metrics.decision_latency.as_millis() as u64,
            match_ms = metrics.match_latency.as_millis() as u64,
            sla_ticks = metrics.sla_ticks,
            digest = %digest,
            "Tick committed"
        );

        Ok(TickOutcome::Committed { seq, metrics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::RecordingDispatcher;
    use crate::error::SchedulerError;
    use crate::provider::MemorySnapshotProvider;
    use crate::sink::MemorySink;
    use fleet_model::Snapshot;
    use fleet_testing::ClusterBuilder;

    fn snapshot(seq: u64) -> Snapshot {
        ClusterBuilder::new()
            .seq(seq)
            .group("a100")
            .nodes("n", 2, "room1")
            .user("alice", 2)
            .queued(1, "alice", 10, 1)
            .build()
    }

    struct Harness {
        provider: MemorySnapshotProvider,
        sink: MemorySink,
        dispatcher: RecordingDispatcher,
        worker: SchedulerWorker,
    }

    fn harness() -> Harness {
        let provider = MemorySnapshotProvider::new();
        let sink = MemorySink::new();
        let dispatcher = RecordingDispatcher::new();
        let worker = SchedulerWorker::new(
            Arc::new(provider.clone()),
            Arc::new(sink.clone()),
            Arc::new(dispatcher.clone()),
            EngineConfig::default(),
        );
        Harness {
            provider,
            sink,
            dispatcher,
            worker,
        }
    }

    #[tokio::test]
    async fn test_idle_without_snapshot() {
        let mut h = harness();
        assert_eq!(h.worker.tick().await.unwrap(), TickOutcome::Idle);
    }

    #[tokio::test]
    async fn test_commit_then_skip_same_seq() {
        let mut h = harness();
        h.provider.publish(snapshot(1)).await;

        let first = h.worker.tick().await.unwrap();
        assert!(matches!(first, TickOutcome::Committed { .. }));
        assert_eq!(h.worker.checkpoint().last_seq, Some(SnapshotSeq::new(1)));

        let second = h.worker.tick().await.unwrap();
        assert_eq!(second, TickOutcome::Skipped { seq: SnapshotSeq::new(1) });
        assert_eq!(h.sink.committed().await.len(), 1);
        assert_eq!(h.dispatcher.batches().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_commit_is_retried() {
        let mut h = harness();
        h.provider.publish(snapshot(3)).await;
        h.sink.fail_next(1).await;

        let err = h.worker.tick().await.unwrap_err();
        assert!(matches!(err, SchedulerError::Sink(_)));
        assert_eq!(h.worker.checkpoint().last_seq, None);
        assert!(h.dispatcher.batches().await.is_empty());

        let retried = h.worker.tick().await.unwrap();
        assert!(matches!(retried, TickOutcome::Committed { .. }));
    }

    #[tokio::test]
    async fn test_dispatch_failure_does_not_fail_tick() {
        let mut h = harness();
        h.provider.publish(snapshot(1)).await;
        h.dispatcher.set_unavailable(true).await;

        let outcome = h.worker.tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::Committed { .. }));
        assert_eq!(h.sink.committed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mut h = harness();
        h.provider.publish(snapshot(1)).await;
        let (tx, rx) = watch::channel(false);

        let mut worker = h.worker.with_interval(Duration::from_millis(10));
        let handle = tokio::spawn(async move {
            worker.run(rx).await;
            worker
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let worker = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(worker.checkpoint().last_seq, Some(SnapshotSeq::new(1)));
        assert_eq!(h.sink.committed().await.len(), 1);
    }
}
