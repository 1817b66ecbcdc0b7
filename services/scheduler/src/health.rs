//! Tick health metrics.
//!
//! Purely observational: nothing here feeds back into scheduling decisions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_id::SnapshotSeq;
use fleet_reconcile::SlaWindow;
use tracing::warn;

/// Measurements for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickMetrics {
    pub seq: SnapshotSeq,

    /// From snapshot capture to decision.
    pub decision_latency: Duration,

    /// Wall time of the matching stage.
    pub match_latency: Duration,

    /// This tick overran the SLA.
    pub sla_overrun: bool,

    /// Overrunning ticks in the current window, this one included.
    pub sla_ticks: usize,
}

/// Rolling tick health owned by the tick loop.
#[derive(Debug, Clone)]
pub struct TickHealth {
    window: SlaWindow,
    last: Option<TickMetrics>,
}

impl Default for TickHealth {
    fn default() -> Self {
        Self::new(SlaWindow::default())
    }
}

impl TickHealth {
    pub fn new(window: SlaWindow) -> Self {
        Self { window, last: None }
    }

    /// Record one tick.
    pub fn record(
        &mut self,
        seq: SnapshotSeq,
        taken_at: DateTime<Utc>,
        decided_at: DateTime<Utc>,
        match_latency: Duration,
    ) -> TickMetrics {
        let decision_latency = (decided_at - taken_at).to_std().unwrap_or_default();
        let sla_overrun = self.window.record(match_latency);

        let metrics = TickMetrics {
            seq,
            decision_latency,
            match_latency,
            sla_overrun,
            sla_ticks: self.window.count(),
        };

        if sla_overrun {
            warn!(
                seq = %seq,
                match_ms = match_latency.as_millis() as u64,
                sla_ms = self.window.threshold().as_millis() as u64,
                sla_ticks = metrics.sla_ticks,
                window = self.window.capacity(),
                "Tick exceeded matching SLA"
            );
        }

        self.last = Some(metrics);
        metrics
    }

    /// SLA-violating ticks in the current window.
    pub fn sla_ticks(&self) -> usize {
        self.window.count()
    }

    pub fn last(&self) -> Option<&TickMetrics> {
        self.last.as_ref()
    }
}
