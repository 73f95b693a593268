//! ct-fetch-bench: measure sequential fetch throughput of a CT log.
//!
//! Usage:
//! ```bash
//! # Benchmark the default log with 8 parallel fetchers
//! ct-fetch-bench --parallelism 8
//!
//! # Different log, smaller batches, settings from a file
//! ct-fetch-bench --config bench.toml --log https://ct.example.net/2025h2 --batch-size 256
//! ```
//!
//! Every report interval a line `<entries in interval> <average entries/sec>`
//! is printed to stdout. Logs go to stderr (`RUST_LOG` or `-v` to adjust).

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use url::Url;

use ct_fetch_bench::{Benchmark, Config, Event, Result, RunSummary};

/// Measure how fast a CT log's entries can be fetched in order
#[derive(Parser, Debug)]
#[command(name = "ct-fetch-bench", version)]
struct Cli {
    /// Base URL of the log to test
    #[arg(long = "log", value_name = "URL")]
    log_url: Option<Url>,

    /// Number of entries to fetch per batch
    #[arg(long)]
    batch_size: Option<u64>,

    /// Number of parallel outstanding requests
    #[arg(long, visible_alias = "parallellism")]
    parallelism: Option<usize>,

    /// Pending batch queue bound (defaults to the batch size)
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Seconds between throughput lines
    #[arg(long, value_name = "SECS")]
    report_interval: Option<f64>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    request_timeout: Option<f64>,

    /// Seconds to wait before retrying a failed request
    #[arg(long, value_name = "SECS")]
    retry_interval: Option<f64>,

    /// Give up on a batch after this many failed attempts at the same position
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Keep printing samples after all batches are fetched, until interrupted
    #[arg(long)]
    keep_reporting: bool,

    /// TOML file with settings; flags override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_toml_file(path)?,
            None => Config::default(),
        };

        if let Some(log_url) = self.log_url {
            config.log_url = log_url;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(parallelism) = self.parallelism {
            config.parallelism = parallelism;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = Some(capacity);
        }
        if let Some(secs) = self.report_interval {
            config.report_interval = seconds("report_interval", secs)?;
        }
        if let Some(secs) = self.request_timeout {
            config.request_timeout = seconds("request_timeout", secs)?;
        }
        if let Some(secs) = self.retry_interval {
            config.retry.initial_delay = seconds("retry.initial_delay", secs)?;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.retry.max_attempts = Some(max_attempts);
        }
        if self.keep_reporting {
            config.stop_when_done = false;
        }
        Ok(config)
    }
}

fn seconds(key: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|e| ct_fetch_bench::Error::config(e.to_string(), key))
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ct_fetch_bench=info".into()),
        1 => tracing_subscriber::EnvFilter::new("ct_fetch_bench=debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_summary(summary: &RunSummary) {
    println!(
        "# {} entries in {:.1}s ({:.1}/s), {} of {} batches, {} requests, {} failed{}",
        summary.entries_fetched,
        summary.elapsed_secs,
        summary.average_rate,
        summary.batches_completed,
        summary.batches_dispatched,
        summary.fetch_calls,
        summary.failures,
        if summary.cancelled { ", interrupted" } else { "" },
    );
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    let benchmark = match Benchmark::new(config) {
        Ok(benchmark) => benchmark,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    let mut events = benchmark.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(Event::Sample(sample)) => println!("{sample}"),
                Ok(Event::Stopped(_)) => break,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Output fell behind, dropped events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    match ct_fetch_bench::run_with_shutdown(&benchmark).await {
        Ok(summary) => {
            printer.await.ok();
            print_summary(&summary);
        }
        Err(e) => {
            printer.abort();
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
