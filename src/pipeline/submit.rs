use tracing::{debug, info, warn};

use super::error::TileError;
use super::settings::RetryPolicy;
use super::TileAgent;
use crate::observability::Metrics;
use crate::portal::{Job, PortalApi, PortalReply, TileMetadata};
use crate::products::Product;

/// Start a packaging job for a resolved tile.
///
/// The portal answers `success: false` while it is still provisioning the job, so
/// both rejections and failed requests are retried at a fixed interval until the
/// attempt ceiling is reached.
pub async fn submit(
    portal: &dyn PortalApi,
    product: &dyn Product,
    metadata: &TileMetadata,
    policy: RetryPolicy,
    agent: &TileAgent<'_>,
    metrics: &Metrics,
) -> Result<Job, TileError> {
    let query = product.start_query(&metadata.tile_id, metadata);
    let mut last_message = String::from("no attempt made");

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 {
            metrics.submission_retried();
            tokio::time::sleep(policy.interval).await;
        }

        match portal.start_job(&query, &agent.current()).await {
            Ok(response) => match response.into_reply() {
                PortalReply::Accepted(job_id) => {
                    info!(job_id = %job_id, attempt, "Job submitted");
                    return Ok(Job::submitted(job_id, metadata.tile_id.clone()));
                }
                PortalReply::Rejected { message } => {
                    debug!(attempt, %message, "Job not accepted yet");
                    last_message = message;
                }
            },
            Err(e) => {
                warn!(attempt, error = %e, "Job start request failed");
                last_message = e.to_string();
            }
        }
    }

    Err(TileError::Submission {
        tile_id: metadata.tile_id.clone(),
        attempts: policy.max_attempts,
        message: last_message,
    })
}
