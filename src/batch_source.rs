//! Bounded queue of pending batches shared by the worker pool
//!
//! One producer pushes batch indices in ascending order and then closes the
//! queue. Any number of workers pull from it; each index reaches exactly one
//! worker. A closed, drained queue is how workers learn there is no more work.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::BatchIndex;

/// Create a queue holding at most `capacity` pending indices (minimum 1)
pub fn batch_source(capacity: usize) -> (BatchSender, BatchReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        BatchSender { tx, enqueued: 0 },
        BatchReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer half; dropping or [`close`](BatchSender::close)-ing it ends the queue
#[derive(Debug)]
pub struct BatchSender {
    tx: mpsc::Sender<BatchIndex>,
    enqueued: u64,
}

impl BatchSender {
    /// Push an index, waiting while the queue is full
    ///
    /// Fails with [`Error::ShuttingDown`] once every receiver is gone.
    pub async fn enqueue(&mut self, index: BatchIndex) -> Result<()> {
        self.tx
            .send(index)
            .await
            .map_err(|_| Error::ShuttingDown)?;
        self.enqueued += 1;
        Ok(())
    }

    /// Indices accepted so far
    pub fn enqueued(&self) -> u64 {
        self.enqueued
    }

    /// Signal that no more indices will arrive; returns how many were sent
    pub fn close(self) -> u64 {
        self.enqueued
    }
}

/// Consumer half, cheap to clone into every worker
#[derive(Clone, Debug)]
pub struct BatchReceiver {
    rx: Arc<Mutex<mpsc::Receiver<BatchIndex>>>,
}

impl BatchReceiver {
    /// Next pending index, or `None` once the queue is closed and empty
    pub async fn dequeue(&self) -> Option<BatchIndex> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

/// Feed `indices` into the queue from a dedicated task, then close it
///
/// The task resolves to the number of indices dispatched. Cancellation stops
/// the producer early; the queue still closes so workers drain and exit.
pub fn spawn_producer<I>(
    indices: I,
    mut sender: BatchSender,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<u64>
where
    I: IntoIterator<Item = BatchIndex>,
    I::IntoIter: Send + 'static,
{
    let indices = indices.into_iter();
    tokio::spawn(async move {
        for index in indices {
            tokio::select! {
                result = sender.enqueue(index) => {
                    if let Err(e) = result {
                        tracing::warn!(batch = index.get(), error = %e, "Batch queue has no consumers, stopping producer");
                        break;
                    }
                }
                _ = cancel_token.cancelled() => {
                    tracing::debug!(batch = index.get(), "Producer cancelled");
                    break;
                }
            }
        }
        let dispatched = sender.close();
        tracing::debug!(dispatched, "Batch queue closed");
        dispatched
    })
}
