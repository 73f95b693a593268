//! Benchmark orchestration
//!
//! [`Benchmark::run`] wires the pieces together for one run:
//!
//! 1. ask the log for its size (fatal on failure)
//! 2. partition the log into full batches and start the producer
//! 3. start `parallelism` workers pulling from the batch queue
//! 4. start the reporter, which samples the shared counter every interval
//! 5. once every worker has exited, signal the reporter and collect a summary
//!
//! All shared state (counter, queue, clocks) is created here per run and
//! handed to the tasks that need it.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::aggregator::ThroughputAggregator;
use crate::batch_source::{batch_source, spawn_producer};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::BatchFetcher;
use crate::log_client::{HttpLogClient, LogClient};
use crate::partition::{batch_count, dropped_tail, partition};
use crate::reporter::Reporter;
use crate::retry::RetryPolicy;
use crate::types::{Event, RunSummary, WorkerStats};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A configured benchmark against one log
pub struct Benchmark {
    config: Arc<Config>,
    client: Arc<dyn LogClient>,
    event_tx: broadcast::Sender<Event>,
    cancel_token: CancellationToken,
}

impl Benchmark {
    /// Benchmark the log named in `config` over HTTP
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = HttpLogClient::from_config(&config)?;
        Self::with_client(config, Arc::new(client))
    }

    /// Benchmark using a caller-provided [`LogClient`]
    pub fn with_client(config: Config, client: Arc<dyn LogClient>) -> Result<Self> {
        config.validate()?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config: Arc::new(config),
            client,
            event_tx,
            cancel_token: CancellationToken::new(),
        })
    }

    /// Configuration in effect
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to run events (samples, batch completions, failures)
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Token that stops the run when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stop the run: workers abandon their current batch, the reporter flushes and exits
    pub fn shutdown(&self) {
        tracing::info!("Shutting down benchmark");
        self.cancel_token.cancel();
    }

    /// Execute the benchmark
    ///
    /// Fails only if the log size cannot be fetched or the run is cancelled
    /// before that. Fetch failures after startup are retried, never returned.
    pub async fn run(&self) -> Result<RunSummary> {
        let config = &self.config;

        let log_size = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => return Err(Error::ShuttingDown),
            result = self.client.fetch_log_size() => result.inspect_err(|e| {
                tracing::error!(error = %e, log = %config.log_url, "Failed to fetch log size");
            })?,
        };

        let batches = batch_count(log_size, config.batch_size);
        let dropped_entries = dropped_tail(log_size, config.batch_size);
        tracing::info!(
            log = %config.log_url,
            log_size,
            batch_size = config.batch_size,
            batches,
            parallelism = config.parallelism,
            "Starting benchmark"
        );
        if dropped_entries > 0 {
            tracing::info!(dropped_entries, "Trailing partial batch will not be fetched");
        }
        self.event_tx
            .send(Event::Started {
                log_size,
                batches,
                dropped_entries,
            })
            .ok();

        let aggregator = Arc::new(ThroughputAggregator::new());
        let started_at = Utc::now();
        let reporter = Reporter::new(
            Arc::clone(&aggregator),
            config.report_interval,
            self.event_tx.clone(),
        );

        let (sender, receiver) = batch_source(config.queue_capacity());
        let producer = spawn_producer(
            partition(log_size, config.batch_size),
            sender,
            self.cancel_token.child_token(),
        );

        let fetcher = Arc::new(BatchFetcher::new(
            Arc::clone(&self.client),
            Arc::clone(&aggregator),
            RetryPolicy::new(&config.retry),
            config.batch_size,
            self.event_tx.clone(),
        ));
        let workers: Vec<_> = (0..config.parallelism)
            .map(|worker_id| {
                let fetcher = Arc::clone(&fetcher);
                let receiver = receiver.clone();
                let cancel_token = self.cancel_token.child_token();
                tokio::spawn(async move { fetcher.run_worker(worker_id, receiver, cancel_token).await })
            })
            .collect();
        drop(receiver);

        // Fired only after the pool has joined, on shutdown too
        let workers_done = CancellationToken::new();
        let reporter_task = tokio::spawn(reporter.run(
            workers_done.clone(),
            config.stop_when_done,
            self.cancel_token.child_token(),
        ));

        let mut totals = WorkerStats::default();
        for (worker_id, joined) in futures::future::join_all(workers).await.into_iter().enumerate() {
            match joined {
                Ok(stats) => {
                    totals.batches_completed += stats.batches_completed;
                    totals.batches_abandoned += stats.batches_abandoned;
                    totals.fetch_calls += stats.fetch_calls;
                    totals.failures += stats.failures;
                }
                Err(e) => {
                    tracing::error!(worker = worker_id, error = %e, "Worker task failed");
                }
            }
        }
        let batches_dispatched = match producer.await {
            Ok(dispatched) => dispatched,
            Err(e) => {
                tracing::error!(error = %e, "Producer task failed");
                totals.batches_completed + totals.batches_abandoned
            }
        };

        tracing::info!(
            batches_completed = totals.batches_completed,
            batches_abandoned = totals.batches_abandoned,
            "All workers finished"
        );
        self.event_tx.send(Event::WorkersFinished).ok();
        workers_done.cancel();

        let outcome = reporter_task.await?;
        let elapsed_secs = outcome.elapsed.as_secs_f64();
        let summary = RunSummary {
            log_size,
            batch_size: config.batch_size,
            parallelism: config.parallelism,
            batches_dispatched,
            batches_completed: totals.batches_completed,
            batches_abandoned: totals.batches_abandoned,
            entries_fetched: outcome.total_entries,
            fetch_calls: totals.fetch_calls,
            failures: totals.failures,
            started_at,
            elapsed_secs,
            average_rate: if elapsed_secs > 0.0 {
                outcome.total_entries as f64 / elapsed_secs
            } else {
                0.0
            },
            cancelled: outcome.cancelled,
        };

        tracing::info!(
            entries = summary.entries_fetched,
            elapsed_secs = %format!("{:.1}", summary.elapsed_secs),
            rate = %format!("{:.1}", summary.average_rate),
            cancelled = summary.cancelled,
            "Benchmark finished"
        );
        self.event_tx.send(Event::Stopped(summary.clone())).ok();
        Ok(summary)
    }
}
