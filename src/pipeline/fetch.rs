use bytes::Bytes;
use tracing::{info, warn};

use super::error::TileError;
use super::settings::FetchPolicy;
use crate::observability::Metrics;
use crate::portal::{PortalApi, PortalError};

/// Download a finished archive. Only read timeouts are retried.
pub async fn fetch_archive(
    portal: &dyn PortalApi,
    url: &str,
    policy: FetchPolicy,
    metrics: &Metrics,
) -> Result<Bytes, TileError> {
    let mut retries = 0;

    loop {
        match portal.download(url).await {
            Ok(bytes) => {
                info!(url, size = bytes.len(), retries, "Archive downloaded");
                return Ok(bytes);
            }
            Err(PortalError::Timeout) if retries < policy.max_retries => {
                retries += 1;
                metrics.fetch_retried();
                warn!(url, retry = retries, delay_ms = policy.retry_delay.as_millis() as u64, "Download timed out, retrying");
                tokio::time::sleep(policy.retry_delay).await;
            }
            Err(e) => {
                return Err(TileError::Fetch {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
}
