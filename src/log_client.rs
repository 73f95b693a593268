//! Access to the remote log: the two read-only CT endpoints the benchmark needs.

use std::time::Duration;

use serde::Deserialize;
use serde::de::IgnoredAny;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};

/// Abstraction over the log's HTTP API, enabling testability.
#[async_trait::async_trait]
pub trait LogClient: Send + Sync {
    /// Current tree size (`get-sth`)
    async fn fetch_log_size(&self) -> Result<u64>;

    /// Fetch entries in `[start, end)` and return how many the log sent back
    ///
    /// Logs paginate, so the count may be smaller than `end - start`.
    async fn fetch_entries(&self, start: u64, end: u64) -> Result<u64>;
}

#[derive(Deserialize)]
struct SignedTreeHead {
    tree_size: Option<u64>,
}

#[derive(Deserialize)]
struct GetEntriesResponse {
    entries: Option<Vec<IgnoredAny>>,
}

/// Production [`LogClient`] speaking the CT v1 JSON API over `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpLogClient {
    client: reqwest::Client,
    base: Url,
}

impl HttpLogClient {
    /// Client for the log rooted at `base` (e.g. `https://ct.googleapis.com/logs/xenon2022`)
    pub fn new(base: Url, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ct-fetch-bench/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base: with_trailing_slash(base),
        })
    }

    /// Client built from the benchmark configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.log_url.clone(), config.request_timeout)
    }

    fn endpoint(&self, name: &str) -> Result<Url> {
        self.base
            .join("ct/v1/")
            .and_then(|v1| v1.join(name))
            .map_err(|e| Error::config(e.to_string(), "log_url"))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait::async_trait]
impl LogClient for HttpLogClient {
    async fn fetch_log_size(&self) -> Result<u64> {
        let url = self.endpoint("get-sth")?;
        let sth: SignedTreeHead = self.get_json(url).await?;
        sth.tree_size.ok_or(Error::MissingField("tree_size"))
    }

    async fn fetch_entries(&self, start: u64, end: u64) -> Result<u64> {
        if end <= start {
            return Ok(0);
        }
        let mut url = self.endpoint("get-entries")?;
        // The CT API takes an inclusive upper bound
        url.query_pairs_mut()
            .append_pair("start", &start.to_string())
            .append_pair("end", &(end - 1).to_string());

        let page: GetEntriesResponse = self.get_json(url).await?;
        let entries = page.entries.ok_or(Error::MissingField("entries"))?;
        Ok(entries.len() as u64)
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
