//! Periodic throughput reporting
//!
//! The reporter is the only reader of the shared counter. Once per interval it
//! drains the counter, adds the drained value to its running total, and emits
//! a [`ThroughputSample`] with the interval count and the average rate since
//! the run began.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::aggregator::ThroughputAggregator;
use crate::types::{Event, ThroughputSample};

/// How the reporter loop ended
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReporterOutcome {
    /// Entries drained over the whole run
    pub total_entries: u64,
    /// Time from start to the last sample
    pub elapsed: Duration,
    /// Samples emitted
    pub samples: u64,
    /// Whether the run was cancelled before the batches ran out
    pub cancelled: bool,
}

/// Drains the aggregator on a fixed period and publishes samples
pub struct Reporter {
    aggregator: Arc<ThroughputAggregator>,
    interval: Duration,
    started_at: Instant,
    total: u64,
    samples: u64,
    event_tx: broadcast::Sender<Event>,
}

impl Reporter {
    /// Create a reporter whose clock starts now
    pub fn new(
        aggregator: Arc<ThroughputAggregator>,
        interval: Duration,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            aggregator,
            interval,
            started_at: Instant::now(),
            total: 0,
            samples: 0,
            event_tx,
        }
    }

    /// Entries drained so far
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Drain the counter and emit one sample
    pub fn tick(&mut self) -> ThroughputSample {
        let drained = self.aggregator.drain_and_reset();
        self.total += drained;
        self.samples += 1;

        let sample = ThroughputSample::new(
            drained,
            self.total,
            self.started_at.elapsed().as_secs_f64(),
        );
        tracing::info!(
            entries = sample.interval_entries,
            total = sample.total_entries,
            rate = %format!("{:.1}", sample.average_rate),
            "Throughput"
        );
        self.event_tx.send(Event::Sample(sample)).ok();
        sample
    }

    /// Report every interval until every worker has exited
    ///
    /// `workers_done` fires once the worker pool has joined, whether the
    /// batches ran out or the run was cancelled, so no page counted by a
    /// worker can land after the last drain. With `stop_when_done` unset the
    /// reporter keeps emitting samples after that until `cancel_token` fires.
    /// Either way a last sample is emitted on the way out.
    pub async fn run(
        mut self,
        workers_done: CancellationToken,
        stop_when_done: bool,
        cancel_token: CancellationToken,
    ) -> ReporterOutcome {
        let mut interval =
            tokio::time::interval_at(self.started_at + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tokio::select! {
            biased;
            _ = workers_done.cancelled() => {}
            _ = self.tick_every(&mut interval) => {}
        }
        if !stop_when_done {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {}
                _ = self.tick_every(&mut interval) => {}
            }
        }

        self.tick();
        ReporterOutcome {
            total_entries: self.total,
            elapsed: self.started_at.elapsed(),
            samples: self.samples,
            cancelled: cancel_token.is_cancelled(),
        }
    }

    async fn tick_every(&mut self, interval: &mut Interval) -> Infallible {
        loop {
            interval.tick().await;
            self.tick();
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn reporter(interval: Duration) -> (Reporter, Arc<ThroughputAggregator>, broadcast::Receiver<Event>) {
        let aggregator = Arc::new(ThroughputAggregator::new());
        let (event_tx, event_rx) = broadcast::channel(64);
        (
            Reporter::new(Arc::clone(&aggregator), interval, event_tx),
            aggregator,
            event_rx,
        )
    }

    fn samples(events: &mut broadcast::Receiver<Event>) -> Vec<ThroughputSample> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let Event::Sample(sample) = event {
                out.push(sample);
            }
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn tick_drains_and_accumulates() {
        let (mut reporter, aggregator, _events) = reporter(Duration::from_secs(1));

        aggregator.add(1000);
        tokio::time::advance(Duration::from_secs(1)).await;
        let first = reporter.tick();
        assert_eq!(first.interval_entries, 1000);
        assert_eq!(first.total_entries, 1000);
        assert_eq!(first.average_rate, 1000.0);

        aggregator.add(3000);
        tokio::time::advance(Duration::from_secs(1)).await;
        let second = reporter.tick();
        assert_eq!(second.interval_entries, 3000);
        assert_eq!(second.total_entries, 4000);
        assert_eq!(second.average_rate, 2000.0);
        assert_eq!(aggregator.pending(), 0);
        assert_eq!(reporter.total(), 4000);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_run_reports_zero_until_workers_finish() {
        let (reporter, _aggregator, mut events) = reporter(Duration::from_secs(1));
        let done = CancellationToken::new();
        let handle = tokio::spawn(reporter.run(done.clone(), true, CancellationToken::new()));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        done.cancel();
        let outcome = handle.await.unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(outcome.total_entries, 0);
        assert_eq!(outcome.samples, 4, "three ticks plus the final flush");
        let samples = samples(&mut events);
        assert_eq!(samples.len(), 4);
        assert!(samples.iter().all(|s| s.interval_entries == 0 && s.average_rate == 0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_waits_for_workers_before_last_drain() {
        let (reporter, aggregator, mut events) = reporter(Duration::from_secs(1));
        let done = CancellationToken::new();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(reporter.run(done.clone(), true, cancel.clone()));

        aggregator.add(100);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();
        tokio::task::yield_now().await;
        assert!(!handle.is_finished());

        // A worker finishing its page after shutdown was requested
        aggregator.add(24);
        done.cancel();
        let outcome = handle.await.unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.total_entries, 124);
        assert_eq!(aggregator.pending(), 0);
        assert_eq!(samples(&mut events).last().unwrap().total_entries, 124);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_flushes_and_stops() {
        let (reporter, aggregator, mut events) = reporter(Duration::from_secs(1));
        let done = CancellationToken::new();
        let handle = tokio::spawn(reporter.run(done.clone(), true, CancellationToken::new()));

        aggregator.add(100);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        aggregator.add(50);
        done.cancel();
        let outcome = handle.await.unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(outcome.total_entries, 150);
        let samples = samples(&mut events);
        assert_eq!(
            samples.iter().map(|s| s.interval_entries).collect::<Vec<_>>(),
            vec![100, 50]
        );
        assert_eq!(samples.last().unwrap().total_entries, 150);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_reporting_after_completion_when_asked() {
        let (reporter, _aggregator, _events) = reporter(Duration::from_secs(1));
        let done = CancellationToken::new();
        let cancel = CancellationToken::new();
        done.cancel();
        let handle = tokio::spawn(reporter.run(done, false, cancel.clone()));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!handle.is_finished());
        cancel.cancel();

        let outcome = handle.await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.samples, 3);
    }
}
