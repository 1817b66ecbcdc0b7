//! Intent dispatch to the remote-execution collaborator.
//!
//! Dispatch happens after a successful commit. The committed assignment is
//! the source of truth, so a failed dispatch is logged and not retried by
//! the tick loop.

use std::sync::Arc;

use async_trait::async_trait;
use fleet_model::{IntentBatch, IntentKind};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::DispatchError;

/// Receiver of per-task intents.
#[async_trait]
pub trait IntentDispatcher: Send + Sync {
    async fn dispatch(&self, batch: &IntentBatch) -> Result<(), DispatchError>;
}

/// Logs every state-changing intent.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl IntentDispatcher for LogDispatcher {
    async fn dispatch(&self, batch: &IntentBatch) -> Result<(), DispatchError> {
        for intent in batch.transitions() {
            info!(
                seq = %batch.seq,
                task_id = %intent.task_id,
                chain_id = %intent.chain_id,
                user = %intent.user_name,
                group = %intent.group,
                intent = %intent.kind,
                nodes = intent.nodes.len(),
                "Dispatching intent"
            );
        }
        let keep_running = batch
            .intents
            .iter()
            .filter(|i| i.kind == IntentKind::KeepRunning)
            .count();
        debug!(seq = %batch.seq, keep_running, "Intent batch dispatched");
        Ok(())
    }
}

/// Records batches in memory; can be switched off to simulate an outage.
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    batches: Arc<Mutex<Vec<IntentBatch>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().await = unavailable;
    }

    pub async fn batches(&self) -> Vec<IntentBatch> {
        self.batches.lock().await.clone()
    }
}

#[async_trait]
impl IntentDispatcher for RecordingDispatcher {
    async fn dispatch(&self, batch: &IntentBatch) -> Result<(), DispatchError> {
        if *self.unavailable.lock().await {
            return Err(DispatchError::Unavailable("recording dispatcher offline".into()));
        }
        self.batches.lock().await.push(batch.clone());
        Ok(())
    }
}
