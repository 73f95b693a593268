//! # ct-fetch-bench
//!
//! Measures how fast entries can be pulled, in order, from a Certificate
//! Transparency log's `get-entries` endpoint with a fixed pool of concurrent
//! fetchers.
//!
//! ## How a run works
//!
//! - The log size is fetched once (`get-sth`). The range `[0, size)` is cut
//!   into fixed-size batches; a trailing partial batch is skipped.
//! - A producer feeds batch indices into a bounded queue; `parallelism`
//!   workers take batches from it and fetch each one to the end, retrying
//!   failed pages in place.
//! - Workers add fetched entries to a shared counter. A reporter drains it
//!   every interval and emits the interval count plus the running average rate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ct_fetch_bench::{Benchmark, Config, Event};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         batch_size: 256,
//!         parallelism: 8,
//!         ..Default::default()
//!     };
//!
//!     let benchmark = Benchmark::new(config)?;
//!
//!     let mut events = benchmark.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             if let Event::Sample(sample) = event {
//!                 println!("{sample}");
//!             }
//!         }
//!     });
//!
//!     let summary = benchmark.run().await?;
//!     println!("fetched {} entries", summary.entries_fetched);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Shared entry counter
pub mod aggregator;
/// Bounded queue of pending batches
pub mod batch_source;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Per-batch fetch loop and worker
pub mod fetcher;
/// CT log HTTP client
pub mod log_client;
/// Splitting the log into batches
pub mod partition;
/// Periodic throughput reporting
pub mod reporter;
/// Retry policy
pub mod retry;
/// Benchmark orchestration
pub mod runner;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{Config, RetryConfig};
pub use error::{Error, Result};
pub use log_client::{HttpLogClient, LogClient};
pub use runner::Benchmark;
pub use types::{BatchIndex, BatchOutcome, Event, RunSummary, ThroughputSample, WorkerStats};

/// Run the benchmark, stopping it cleanly on a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// On a signal the run is cancelled; the reporter emits a last sample and the
/// summary comes back with `cancelled` set.
pub async fn run_with_shutdown(benchmark: &Benchmark) -> Result<RunSummary> {
    let cancel_token = benchmark.cancel_token();
    let signal_task = tokio::spawn(async move {
        wait_for_signal().await;
        cancel_token.cancel();
    });

    let result = benchmark.run().await;
    signal_task.abort();
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
