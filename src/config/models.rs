use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub submission: SubmissionConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub verify: VerifyConfig,
    /// Per-product overrides, keyed by product name (`dgm1`, `alkis`, `bdom`)
    #[serde(default)]
    pub products: HashMap<String, ProductConfig>,
}

/// Portal endpoints and HTTP client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortalConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_detail_path")]
    pub detail_path: String,
    #[serde(default = "default_job_path")]
    pub job_path: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Timeout for the JSON requests (detail, start, status)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Pin a single User-Agent instead of drawing a random one per tile
    pub user_agent: Option<String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            detail_path: default_detail_path(),
            job_path: default_job_path(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: None,
        }
    }
}

fn default_base_url() -> String {
    "https://geodaten.schleswig-holstein.de/gaialight-sh/_apps/dladownload/".to_string()
}

fn default_detail_path() -> String {
    "_ajax/details.php".to_string()
}

fn default_job_path() -> String {
    "multi.php".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Status polling cadence and ceiling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_poll_max_attempts(),
        }
    }
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_poll_max_attempts() -> u32 {
    300
}

/// Job-start retry cadence and ceiling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmissionConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_submission_max_attempts")]
    pub max_attempts: u32,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_submission_max_attempts(),
        }
    }
}

fn default_submission_max_attempts() -> u32 {
    10
}

/// Archive download settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Retries after a read timeout; other failures are never retried
    #[serde(default = "default_fetch_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_download_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            max_retries: default_fetch_max_retries(),
            request_timeout_secs: default_download_timeout_secs(),
        }
    }
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_fetch_max_retries() -> u32 {
    1
}

fn default_download_timeout_secs() -> u64 {
    300
}

/// Local staging directory
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StagingConfig {
    #[serde(default = "default_staging_root")]
    pub root: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            root: default_staging_root(),
        }
    }
}

fn default_staging_root() -> PathBuf {
    PathBuf::from("data/tiles")
}

/// Batch defaults, overridable from the command line
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Whether `end` is part of the tile range
    #[serde(default)]
    pub inclusive_range: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            inclusive_range: false,
        }
    }
}

fn default_concurrency() -> usize {
    1
}

/// Report verification thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VerifyConfig {
    #[serde(default = "default_min_size")]
    pub min_size: ByteSize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
        }
    }
}

fn default_min_size() -> ByteSize {
    ByteSize(10 * 1024) // 10 KB
}

/// Per-product overrides
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProductConfig {
    /// Certificate verification; the product's own default applies when unset
    pub verify_tls: Option<bool>,
}

impl PortalConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Effective certificate verification for a product
    pub fn verify_tls(&self, product: &str, product_default: bool) -> bool {
        self.products
            .get(product)
            .and_then(|p| p.verify_tls)
            .unwrap_or(product_default)
    }
}
