use tracing::{debug, info, warn};

use super::error::TileError;
use super::settings::RetryPolicy;
use super::TileAgent;
use crate::observability::Metrics;
use crate::portal::{Job, PortalApi};

/// Poll a job until the portal reports it done.
///
/// A failed status request ends the tile immediately. An explicit
/// `success: false` (or `failed` state) wins over any `done` status in the same
/// reply. After `policy.max_attempts` requests without `done` the job is
/// abandoned.
pub async fn poll_until_done(
    portal: &dyn PortalApi,
    mut job: Job,
    policy: RetryPolicy,
    agent: &TileAgent<'_>,
    metrics: &Metrics,
) -> Result<Job, TileError> {
    for attempt in 1..=policy.max_attempts {
        metrics.status_requested();
        let status = portal
            .job_status(&job.job_id, &agent.current())
            .await
            .map_err(|e| TileError::Poll {
                job_id: job.job_id.clone(),
                message: e.to_string(),
            })?;

        job.apply(status);

        if job.is_failed() {
            let message = job
                .message
                .clone()
                .unwrap_or_else(|| "job failed".to_string());
            warn!(job_id = %job.job_id, attempt, %message, "Job failed on portal");
            return Err(TileError::JobFailed {
                job_id: job.job_id.clone(),
                message,
            });
        }

        if job.is_done() {
            if job.ready_url().is_none() {
                return Err(TileError::Poll {
                    job_id: job.job_id.clone(),
                    message: "job is done but carries no download url".to_string(),
                });
            }
            info!(job_id = %job.job_id, attempts = attempt, "Job done");
            return Ok(job);
        }

        debug!(job_id = %job.job_id, attempt, state = ?job.state, "Job not done yet");
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(TileError::PollTimeout {
        job_id: job.job_id,
        attempts: policy.max_attempts,
    })
}
