//! Event collection helpers

use std::collections::HashMap;

use ct_fetch_bench::{BatchIndex, Event, ThroughputSample};
use tokio::sync::broadcast;

/// Everything observed on the event channel during one run
#[derive(Debug, Default)]
pub struct RunEvents {
    /// Throughput samples, in emission order
    pub samples: Vec<ThroughputSample>,
    /// Completed batches and the worker that fetched each
    pub completed: Vec<(usize, BatchIndex)>,
    /// Failed fetches as `(start, end)`
    pub failures: Vec<(u64, u64)>,
    /// Whether `WorkersFinished` was seen
    pub workers_finished: bool,
}

impl RunEvents {
    /// How many times each batch index was completed
    pub fn completions_per_batch(&self) -> HashMap<u64, usize> {
        let mut counts = HashMap::new();
        for (_, index) in &self.completed {
            *counts.entry(index.get()).or_insert(0) += 1;
        }
        counts
    }
}

/// Drain buffered events until `Stopped`
///
/// Call after the run has returned; the channel must be large enough to
/// hold every event of the run.
pub fn collect_events(events: &mut broadcast::Receiver<Event>) -> RunEvents {
    let mut run = RunEvents::default();
    while let Ok(event) = events.try_recv() {
        match event {
            Event::Sample(sample) => run.samples.push(sample),
            Event::BatchCompleted { worker_id, outcome } => {
                run.completed.push((worker_id, outcome.index));
            }
            Event::FetchFailed { start, end, .. } => run.failures.push((start, end)),
            Event::WorkersFinished => run.workers_finished = true,
            Event::Stopped(_) => break,
            Event::Started { .. } | Event::BatchAbandoned { .. } => {}
        }
    }
    run
}
