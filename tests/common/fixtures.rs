//! Mock log and configuration fixtures

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use ct_fetch_bench::{Config, Error, LogClient, Result, RetryConfig};

/// In-memory log with per-cursor scripted responses
///
/// Requests for a `(start, end)` pair pop from that pair's script first; once
/// the script is empty the full requested range is returned. Every call is
/// recorded in order.
pub struct ScriptedLog {
    size: u64,
    page_limit: Option<u64>,
    scripts: Mutex<HashMap<(u64, u64), VecDeque<Result<u64>>>>,
    calls: Mutex<Vec<(u64, u64)>>,
}

impl ScriptedLog {
    /// Log of `size` entries answering every request in full
    pub fn new(size: u64) -> Self {
        Self {
            size,
            page_limit: None,
            scripts: Mutex::default(),
            calls: Mutex::default(),
        }
    }

    /// Cap every page at `limit` entries, like a real log's server-side page size
    pub fn with_page_limit(mut self, limit: u64) -> Self {
        self.page_limit = Some(limit);
        self
    }

    /// Queue responses for requests of exactly `(start, end)`
    pub fn script(self, start: u64, end: u64, responses: Vec<Result<u64>>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry((start, end))
            .or_default()
            .extend(responses);
        self
    }

    /// Every `(start, end)` requested so far, in call order
    pub fn calls(&self) -> Vec<(u64, u64)> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of requests issued for `(start, end)`
    pub fn calls_for(&self, start: u64, end: u64) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == (start, end))
            .count()
    }
}

#[async_trait::async_trait]
impl LogClient for ScriptedLog {
    async fn fetch_log_size(&self) -> Result<u64> {
        Ok(self.size)
    }

    async fn fetch_entries(&self, start: u64, end: u64) -> Result<u64> {
        self.calls.lock().unwrap().push((start, end));
        // Yield so concurrent workers actually interleave
        tokio::task::yield_now().await;

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&(start, end))
            .and_then(VecDeque::pop_front);
        if let Some(response) = scripted {
            return response;
        }

        let available = end.min(self.size).saturating_sub(start);
        Ok(self
            .page_limit
            .map_or(available, |limit| available.min(limit)))
    }
}

/// A transient failure as the HTTP client would report it
pub fn bad_gateway() -> Result<u64> {
    Err(Error::HttpStatus {
        status: 502,
        url: "http://log.test/ct/v1/get-entries".to_string(),
    })
}

/// Config with short intervals suitable for paused-clock tests
pub fn test_config(batch_size: u64, parallelism: usize) -> Config {
    Config {
        batch_size,
        parallelism,
        report_interval: Duration::from_secs(1),
        retry: RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(1),
            ..RetryConfig::default()
        },
        ..Config::default()
    }
}
