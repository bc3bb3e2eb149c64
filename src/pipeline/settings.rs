use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;

/// Fixed-interval retry with an attempt ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }
}

/// Read-timeout retry for archive downloads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub retry_delay: Duration,
    pub max_retries: u32,
}

/// Per-run knobs of [`TilePipeline`](super::TilePipeline)
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub poll: RetryPolicy,
    pub submit: RetryPolicy,
    pub fetch: FetchPolicy,
    pub staging_root: PathBuf,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll: RetryPolicy::new(
                Duration::from_millis(config.polling.interval_ms),
                config.polling.max_attempts,
            ),
            submit: RetryPolicy::new(
                Duration::from_millis(config.submission.interval_ms),
                config.submission.max_attempts,
            ),
            fetch: FetchPolicy {
                retry_delay: Duration::from_millis(config.fetch.retry_delay_ms),
                max_retries: config.fetch.max_retries,
            },
            staging_root: config.staging.root.clone(),
        }
    }

    /// Zero delays everywhere, for stub-driven tests
    pub fn immediate(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            poll: RetryPolicy::new(Duration::ZERO, 300),
            submit: RetryPolicy::new(Duration::ZERO, 10),
            fetch: FetchPolicy {
                retry_delay: Duration::ZERO,
                max_retries: 1,
            },
            staging_root: staging_root.into(),
        }
    }
}
