//! Core types for ct-fetch-bench

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Position of a fixed-size batch within the log
///
/// Batch `i` covers entries `[i * batch_size, (i + 1) * batch_size)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchIndex(pub u64);

impl BatchIndex {
    /// Create a new BatchIndex
    pub fn new(index: u64) -> Self {
        Self(index)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Half-open entry range covered by this batch
    ///
    /// Saturates instead of overflowing; indices produced by
    /// [`crate::partition::partition`] never get near the limit.
    pub fn entry_range(&self, batch_size: u64) -> Range<u64> {
        let start = self.0.saturating_mul(batch_size);
        start..start.saturating_add(batch_size)
    }
}

impl From<u64> for BatchIndex {
    fn from(index: u64) -> Self {
        Self(index)
    }
}

impl std::fmt::Display for BatchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One periodic throughput measurement
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThroughputSample {
    /// Entries fetched during the interval that just ended
    pub interval_entries: u64,
    /// Entries fetched since the run started
    pub total_entries: u64,
    /// Seconds since the run started
    pub elapsed_secs: f64,
    /// `total_entries / elapsed_secs`, 0 when no time has passed
    pub average_rate: f64,
}

impl ThroughputSample {
    /// Build a sample, computing the cumulative average rate
    pub fn new(interval_entries: u64, total_entries: u64, elapsed_secs: f64) -> Self {
        let average_rate = if elapsed_secs > 0.0 {
            total_entries as f64 / elapsed_secs
        } else {
            0.0
        };
        Self {
            interval_entries,
            total_entries,
            elapsed_secs,
            average_rate,
        }
    }
}

impl std::fmt::Display for ThroughputSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {:.6}", self.interval_entries, self.average_rate)
    }
}

/// What it took to finish one batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Batch that was fetched
    pub index: BatchIndex,
    /// Entries counted for this batch
    pub entries: u64,
    /// `get-entries` calls issued, including failed ones
    pub fetch_calls: u64,
    /// Calls that failed or returned no entries
    pub failures: u64,
}

/// Per-worker totals, returned when a worker exits
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Worker number, 0-based
    pub worker_id: usize,
    /// Batches fetched to the end
    pub batches_completed: u64,
    /// Batches given up on (attempt ceiling or shutdown)
    pub batches_abandoned: u64,
    /// Entries counted by this worker
    pub entries: u64,
    /// `get-entries` calls issued
    pub fetch_calls: u64,
    /// Failed or empty calls
    pub failures: u64,
}

impl WorkerStats {
    /// Fold a finished batch into the totals
    pub fn record(&mut self, outcome: &BatchOutcome) {
        self.batches_completed += 1;
        self.entries += outcome.entries;
        self.fetch_calls += outcome.fetch_calls;
        self.failures += outcome.failures;
    }
}

/// Final report of a benchmark run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Tree size reported by the log at startup
    pub log_size: u64,
    /// Entries per batch
    pub batch_size: u64,
    /// Worker count
    pub parallelism: usize,
    /// Batch indices handed to the pool
    pub batches_dispatched: u64,
    /// Batches fetched to the end
    pub batches_completed: u64,
    /// Batches given up on
    pub batches_abandoned: u64,
    /// Entries drained by the reporter
    pub entries_fetched: u64,
    /// `get-entries` calls issued across all workers
    pub fetch_calls: u64,
    /// Failed or empty calls across all workers
    pub failures: u64,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Seconds from start until the reporter stopped
    pub elapsed_secs: f64,
    /// `entries_fetched / elapsed_secs`
    pub average_rate: f64,
    /// Whether the run ended because it was cancelled
    pub cancelled: bool,
}

/// Event emitted during a benchmark run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Log size fetched, workers about to start
    Started {
        /// Tree size reported by the log
        log_size: u64,
        /// Number of full batches that will be dispatched
        batches: u64,
        /// Trailing entries that will not be fetched
        dropped_entries: u64,
    },

    /// Periodic throughput measurement
    Sample(ThroughputSample),

    /// A batch was fetched to the end
    BatchCompleted {
        /// Worker that fetched it
        worker_id: usize,
        /// Batch details
        outcome: BatchOutcome,
    },

    /// A `get-entries` call failed and will be retried
    FetchFailed {
        /// Worker that issued the call
        worker_id: usize,
        /// Cursor start
        start: u64,
        /// Exclusive batch end
        end: u64,
        /// Error message
        error: String,
    },

    /// A batch was given up on
    BatchAbandoned {
        /// Worker that held it
        worker_id: usize,
        /// Batch index
        index: BatchIndex,
        /// Why it was given up on
        reason: String,
    },

    /// Every worker has exited
    WorkersFinished,

    /// The reporter stopped; the run is over
    Stopped(RunSummary),
}
