//! Batch fetching: walk one batch's cursor to the end, then ask for the next batch.
//!
//! A batch `[start, end)` is requested as a whole. Logs paginate, so a call
//! usually returns fewer entries than asked for; the cursor moves past what
//! came back and the remainder is requested again. A failed call never moves
//! the cursor: the identical request is reissued after the retry delay, so no
//! entry is counted twice and none is skipped.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::aggregator::ThroughputAggregator;
use crate::batch_source::BatchReceiver;
use crate::error::{Error, Result};
use crate::log_client::LogClient;
use crate::retry::{IsRetryable, RetryPolicy, retry_with_policy};
use crate::types::{BatchIndex, BatchOutcome, Event, WorkerStats};

/// A batch that was given up on, with whatever progress it made first
#[derive(Debug)]
pub struct AbandonedBatch {
    /// Work done on the batch before it was abandoned
    pub outcome: BatchOutcome,
    /// Why it was abandoned
    pub error: Error,
}

/// Everything a worker needs to fetch batches; shared by the whole pool
pub struct BatchFetcher {
    client: Arc<dyn LogClient>,
    aggregator: Arc<ThroughputAggregator>,
    policy: RetryPolicy,
    batch_size: u64,
    event_tx: broadcast::Sender<Event>,
}

impl BatchFetcher {
    /// Create a fetcher for `batch_size`-entry batches
    pub fn new(
        client: Arc<dyn LogClient>,
        aggregator: Arc<ThroughputAggregator>,
        policy: RetryPolicy,
        batch_size: u64,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            client,
            aggregator,
            policy,
            batch_size,
            event_tx,
        }
    }

    /// Fetch every entry of batch `index`
    ///
    /// Returns once the cursor reaches the end of the batch, or with an
    /// [`AbandonedBatch`] when the retry policy's attempt ceiling is hit at
    /// one cursor position. The attempt count restarts only when the cursor
    /// moves.
    /// Entries are added to the aggregator as each page arrives.
    pub async fn fetch_batch(
        &self,
        worker_id: usize,
        index: BatchIndex,
    ) -> std::result::Result<BatchOutcome, AbandonedBatch> {
        let range = index.entry_range(self.batch_size);
        let (mut start, end) = (range.start, range.end);
        let mut outcome = BatchOutcome {
            index,
            entries: 0,
            fetch_calls: 0,
            failures: 0,
        };

        while start != end {
            // Attempts at this cursor; empty pages count like errors
            let mut attempts = 0u32;
            let result = retry_with_policy(&self.policy, || {
                attempts += 1;
                self.fetch_once(worker_id, start, end)
            })
            .await;

            outcome.fetch_calls += u64::from(attempts);
            match result {
                Ok(returned) => {
                    outcome.failures += u64::from(attempts - 1);
                    let remaining = end - start;
                    if returned > remaining {
                        tracing::debug!(
                            worker = worker_id,
                            start,
                            end,
                            returned,
                            "Log returned more entries than requested, counting only the batch"
                        );
                    }
                    let n = returned.min(remaining);
                    start += n;
                    outcome.entries += n;
                    self.aggregator.add(n);
                }
                Err(e) => {
                    outcome.failures += u64::from(attempts);
                    let error = if e.is_retryable() {
                        Error::RetriesExhausted {
                            start,
                            end,
                            attempts,
                        }
                    } else {
                        e
                    };
                    return Err(AbandonedBatch { outcome, error });
                }
            }
        }

        Ok(outcome)
    }

    /// One request at `start`; a page with no entries is reported as
    /// [`Error::EmptyPage`] so the retry policy treats it as a failed attempt
    async fn fetch_once(&self, worker_id: usize, start: u64, end: u64) -> Result<u64> {
        let result = match self.client.fetch_entries(start, end).await {
            Ok(0) => Err(Error::EmptyPage { start, end }),
            other => other,
        };
        if let Err(e) = &result {
            self.event_tx
                .send(Event::FetchFailed {
                    worker_id,
                    start,
                    end,
                    error: e.to_string(),
                })
                .ok();
        }
        result
    }

    /// Worker loop: fetch batches from `source` until it is closed and drained
    ///
    /// Abandoned batches are logged and counted, never fatal. Cancellation
    /// stops the worker between or in the middle of batches.
    pub async fn run_worker(
        &self,
        worker_id: usize,
        source: BatchReceiver,
        cancel_token: CancellationToken,
    ) -> WorkerStats {
        let mut stats = WorkerStats {
            worker_id,
            ..WorkerStats::default()
        };

        loop {
            let index = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                next = source.dequeue() => match next {
                    Some(index) => index,
                    None => break,
                },
            };

            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    stats.batches_abandoned += 1;
                    tracing::debug!(worker = worker_id, batch = index.get(), "Batch interrupted by shutdown");
                    self.event_tx
                        .send(Event::BatchAbandoned {
                            worker_id,
                            index,
                            reason: Error::ShuttingDown.to_string(),
                        })
                        .ok();
                    break;
                }
                result = self.fetch_batch(worker_id, index) => match result {
                    Ok(outcome) => {
                        stats.record(&outcome);
                        tracing::debug!(
                            worker = worker_id,
                            batch = index.get(),
                            fetch_calls = outcome.fetch_calls,
                            failures = outcome.failures,
                            "Batch complete"
                        );
                        self.event_tx
                            .send(Event::BatchCompleted { worker_id, outcome })
                            .ok();
                    }
                    Err(AbandonedBatch { outcome, error }) => {
                        stats.batches_abandoned += 1;
                        stats.entries += outcome.entries;
                        stats.fetch_calls += outcome.fetch_calls;
                        stats.failures += outcome.failures;
                        tracing::error!(
                            worker = worker_id,
                            batch = index.get(),
                            error = %error,
                            code = error.error_code(),
                            "Abandoning batch"
                        );
                        self.event_tx
                            .send(Event::BatchAbandoned {
                                worker_id,
                                index,
                                reason: error.to_string(),
                            })
                            .ok();
                    }
                },
            }
        }

        tracing::debug!(
            worker = worker_id,
            batches = stats.batches_completed,
            entries = stats.entries,
            "Worker finished"
        );
        stats
    }
}
