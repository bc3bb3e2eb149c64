//! Tracing setup and run counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tilefetch={},warn", default_level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Counters shared by every pipeline run of a batch
#[derive(Debug, Default)]
pub struct Metrics {
    tiles_started: AtomicU64,
    tiles_succeeded: AtomicU64,
    tiles_failed: AtomicU64,
    status_requests: AtomicU64,
    submission_retries: AtomicU64,
    fetch_retries: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tile_started(&self) {
        self.tiles_started.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tiles_started", "Metric incremented");
    }

    pub fn tile_succeeded(&self) {
        self.tiles_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tiles_succeeded", "Metric incremented");
    }

    pub fn tile_failed(&self) {
        self.tiles_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tiles_failed", "Metric incremented");
    }

    pub fn status_requested(&self) {
        self.status_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submission_retried(&self) {
        self.submission_retries.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "submission_retries", "Metric incremented");
    }

    pub fn fetch_retried(&self) {
        self.fetch_retries.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "fetch_retries", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tiles_started: self.tiles_started.load(Ordering::Relaxed),
            tiles_succeeded: self.tiles_succeeded.load(Ordering::Relaxed),
            tiles_failed: self.tiles_failed.load(Ordering::Relaxed),
            status_requests: self.status_requests.load(Ordering::Relaxed),
            submission_retries: self.submission_retries.load(Ordering::Relaxed),
            fetch_retries: self.fetch_retries.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tiles_started: u64,
    pub tiles_succeeded: u64,
    pub tiles_failed: u64,
    pub status_requests: u64,
    pub submission_retries: u64,
    pub fetch_retries: u64,
}
