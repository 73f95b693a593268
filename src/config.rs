//! Configuration types for ct-fetch-bench
//!
//! Every field has a default, so an empty TOML file (or `Config::default()`)
//! benchmarks the Xenon 2022 log with one worker and 1024-entry batches.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use url::Url;

/// Retry behavior for `get-entries` failures
///
/// The defaults describe a fixed one-second backoff with no attempt ceiling:
/// a failing range is retried until it succeeds or the run is cancelled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts allowed on a single cursor position, including the first (default: unbounded)
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier applied to the delay after each failure (default: 1.0, i.e. fixed)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Top-level benchmark configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the log, without the `/ct/v1` suffix
    #[serde(default = "default_log_url")]
    pub log_url: Url,

    /// Entries per batch (default: 1024)
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Number of concurrent fetch workers (default: 1)
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Pending batch queue bound (default: same as `batch_size`)
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// Period between throughput samples (default: 1 second)
    #[serde(default = "default_report_interval", with = "duration_serde")]
    pub report_interval: Duration,

    /// Per-request HTTP timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// Stop reporting once every worker has exited (default: true)
    ///
    /// When false the reporter keeps emitting samples until the process is
    /// interrupted.
    #[serde(default = "default_true")]
    pub stop_when_done: bool,

    /// Retry policy for failed `get-entries` calls
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_url: default_log_url(),
            batch_size: default_batch_size(),
            parallelism: default_parallelism(),
            queue_capacity: None,
            report_interval: default_report_interval(),
            request_timeout: default_request_timeout(),
            stop_when_done: true,
            retry: RetryConfig::default(),
        }
    }
}

impl Config {
    /// Load a configuration from a TOML file; missing keys take their defaults
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {e}", path.display()),
            key: None,
        })?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Effective bound of the pending batch queue
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or_else(|| {
            usize::try_from(self.batch_size)
                .unwrap_or(usize::MAX)
                .clamp(1, MAX_DEFAULT_QUEUE_CAPACITY)
        })
    }

    /// Reject settings that would make the run meaningless or hang at startup
    pub fn validate(&self) -> Result<()> {
        match self.log_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::config(
                    format!("unsupported URL scheme `{other}`"),
                    "log_url",
                ));
            }
        }
        if self.batch_size == 0 {
            return Err(Error::config("must be at least 1", "batch_size"));
        }
        if self.parallelism == 0 {
            return Err(Error::config("must be at least 1", "parallelism"));
        }
        if self.queue_capacity == Some(0) {
            return Err(Error::config("must be at least 1", "queue_capacity"));
        }
        if self.report_interval.is_zero() {
            return Err(Error::config("must be greater than zero", "report_interval"));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::config("must be greater than zero", "request_timeout"));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(Error::config("must be at least 1", "retry.max_attempts"));
        }
        if !(self.retry.backoff_multiplier >= 1.0 && self.retry.backoff_multiplier.is_finite()) {
            return Err(Error::config(
                "must be a finite number >= 1.0",
                "retry.backoff_multiplier",
            ));
        }
        Ok(())
    }
}

/// Upper bound for the derived queue capacity when `batch_size` is huge
const MAX_DEFAULT_QUEUE_CAPACITY: usize = 1 << 16;

fn default_log_url() -> Url {
    // A constant, known-good URL literal
    #[allow(clippy::expect_used)]
    Url::parse("https://ct.googleapis.com/logs/xenon2022").expect("default log URL is valid")
}

fn default_batch_size() -> u64 {
    1024
}

fn default_parallelism() -> usize {
    1
}

fn default_report_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_true() -> bool {
    true
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

// Duration serialization helper, fractional seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_cli_defaults() {
        let config = Config::default();
        assert_eq!(
            config.log_url.as_str(),
            "https://ct.googleapis.com/logs/xenon2022"
        );
        assert_eq!(config.batch_size, 1024);
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.queue_capacity(), 1024);
        assert_eq!(config.report_interval, Duration::from_secs(1));
        assert!(config.stop_when_done);
        assert_eq!(config.retry.max_attempts, None);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(1));
        assert_eq!(config.retry.backoff_multiplier, 1.0);
        assert!(!config.retry.jitter);
        config.validate().unwrap();
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config: Config = toml::from_str(
            r#"
            log_url = "https://log.example/2025h1/"
            batch_size = 256
            parallelism = 8
            report_interval = 0.5

            [retry]
            max_attempts = 4
            initial_delay = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.log_url.as_str(), "https://log.example/2025h1/");
        assert_eq!(config.batch_size, 256);
        assert_eq!(config.parallelism, 8);
        assert_eq!(config.queue_capacity(), 256);
        assert_eq!(config.report_interval, Duration::from_millis(500));
        assert_eq!(config.retry.max_attempts, Some(4));
        assert_eq!(config.retry.initial_delay, Duration::from_secs(2));
        assert_eq!(config.retry.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn negative_duration_is_rejected_by_the_parser() {
        let result = toml::from_str::<Config>("report_interval = -1.0");
        assert!(result.is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "parallelism = 3\nstop_when_done = false").unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert_eq!(config.parallelism, 3);
        assert!(!config.stop_when_done);
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_toml_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Config { .. }), "got {err:?}");
    }

    #[test]
    fn queue_capacity_override_wins() {
        let config = Config {
            queue_capacity: Some(7),
            ..Config::default()
        };
        assert_eq!(config.queue_capacity(), 7);
    }

    #[test]
    fn derived_queue_capacity_is_capped() {
        let config = Config {
            batch_size: u64::MAX,
            ..Config::default()
        };
        assert_eq!(config.queue_capacity(), MAX_DEFAULT_QUEUE_CAPACITY);
    }

    fn rejected_key(config: Config) -> Option<String> {
        match config.validate() {
            Err(Error::Config { key, .. }) => key,
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_zero_values() {
        let cases: Vec<(Config, &str)> = vec![
            (
                Config {
                    batch_size: 0,
                    ..Config::default()
                },
                "batch_size",
            ),
            (
                Config {
                    parallelism: 0,
                    ..Config::default()
                },
                "parallelism",
            ),
            (
                Config {
                    queue_capacity: Some(0),
                    ..Config::default()
                },
                "queue_capacity",
            ),
            (
                Config {
                    report_interval: Duration::ZERO,
                    ..Config::default()
                },
                "report_interval",
            ),
            (
                Config {
                    request_timeout: Duration::ZERO,
                    ..Config::default()
                },
                "request_timeout",
            ),
            (
                Config {
                    retry: RetryConfig {
                        max_attempts: Some(0),
                        ..RetryConfig::default()
                    },
                    ..Config::default()
                },
                "retry.max_attempts",
            ),
        ];

        for (config, key) in cases {
            assert_eq!(rejected_key(config).as_deref(), Some(key));
        }
    }

    #[test]
    fn validate_rejects_shrinking_backoff() {
        let config = Config {
            retry: RetryConfig {
                backoff_multiplier: 0.5,
                ..RetryConfig::default()
            },
            ..Config::default()
        };
        assert_eq!(
            rejected_key(config).as_deref(),
            Some("retry.backoff_multiplier")
        );
    }

    #[test]
    fn validate_rejects_non_http_scheme() {
        let config = Config {
            log_url: Url::parse("ftp://log.example/").unwrap(),
            ..Config::default()
        };
        assert_eq!(rejected_key(config).as_deref(), Some("log_url"));
    }
}
