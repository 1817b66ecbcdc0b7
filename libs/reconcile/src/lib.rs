//! Tick loop primitives.
//!
//! Helpers shared by scheduler tick loops and the replay tooling:
//!
//! - **Checkpoint**: the last snapshot generation whose assignment was
//!   committed. A tick never recomputes a committed generation.
//! - **SLA window**: a bounded history of which recent ticks overran the
//!   latency threshold.
//! - **Assignment digest**: a stable hash of a decision set, used to detect
//!   flapping between ticks on identical input.
//!
//! # Invariants
//!
//! - The checkpoint only moves forward
//! - The SLA window never holds more than its capacity
//! - Digests are independent of JSON key order

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fleet_id::SnapshotSeq;
use sha2::{Digest, Sha256};

/// Default tick cadence.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Matching latency above which a tick counts as an SLA tick.
pub const DEFAULT_SLA: Duration = Duration::from_millis(1000);

/// Number of recent ticks the SLA count covers.
pub const DEFAULT_SLA_WINDOW: usize = 60;

/// Last committed snapshot generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotCheckpoint {
    /// None until the first commit.
    pub last_seq: Option<SnapshotSeq>,

    /// Timestamp of last checkpoint update.
    pub updated_at: DateTime<Utc>,
}

impl Default for SnapshotCheckpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCheckpoint {
    /// Create an empty checkpoint.
    pub fn new() -> Self {
        Self {
            last_seq: None,
            updated_at: Utc::now(),
        }
    }

    /// Check if a snapshot generation has already been committed.
    pub fn is_processed(&self, seq: SnapshotSeq) -> bool {
        self.last_seq.is_some_and(|last| seq <= last)
    }

    /// Advance the checkpoint to a newly committed generation.
    pub fn advance(&mut self, seq: SnapshotSeq) {
        if !self.is_processed(seq) {
            self.last_seq = Some(seq);
            self.updated_at = Utc::now();
        }
    }
}

/// Rolling record of SLA overruns over the most recent ticks.
///
/// Reset at process start. Owned by the tick loop and updated between
/// ticks only.
#[derive(Debug, Clone)]
pub struct SlaWindow {
    threshold: Duration,
    capacity: usize,
    overruns: VecDeque<bool>,
}

impl Default for SlaWindow {
    fn default() -> Self {
        Self::new(DEFAULT_SLA, DEFAULT_SLA_WINDOW)
    }
}

impl SlaWindow {
    /// A window of `capacity` ticks (at least one).
    pub fn new(threshold: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            threshold,
            capacity,
            overruns: VecDeque::with_capacity(capacity),
        }
    }

    /// Record one tick's latency. Returns true if it overran the threshold.
    pub fn record(&mut self, latency: Duration) -> bool {
        let overrun = latency > self.threshold;
        if self.overruns.len() == self.capacity {
            self.overruns.pop_front();
        }
        self.overruns.push_back(overrun);
        overrun
    }

    /// Overrunning ticks currently in the window.
    pub fn count(&self) -> usize {
        self.overruns.iter().filter(|o| **o).count()
    }

    /// Ticks currently in the window.
    pub fn len(&self) -> usize {
        self.overruns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overruns.is_empty()
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Stable digest of a decision set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssignmentDigest(String);

impl AssignmentDigest {
    /// Compute a digest from canonical JSON.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let canonical = canonical_json(json);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&result[..16])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssignmentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produce canonical JSON (sorted keys, no extra whitespace).
fn canonical_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut pairs: Vec<_> = map.iter().collect();
            pairs.sort_by_key(|(k, _)| *k);
            let inner: Vec<String> = pairs
                .iter()
                .map(|(k, v)| format!("{}:{}", quote(k), canonical_json(v)))
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        serde_json::Value::Array(arr) => {
            let inner: Vec<String> = arr.iter().map(canonical_json).collect();
            format!("[{}]", inner.join(","))
        }
        serde_json::Value::String(s) => quote(s),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
