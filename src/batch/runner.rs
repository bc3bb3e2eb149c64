use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{BatchError, BatchOptions, BatchResult, TileOutcome, TileRange};
use crate::pipeline::{TileError, TileOutput, TilePipeline};
use crate::portal::TileId;

/// Runs the tile pipeline over a list of tiles with a bounded number in flight
pub struct BatchRunner {
    pipeline: Arc<TilePipeline>,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(pipeline: Arc<TilePipeline>) -> Self {
        Self {
            pipeline,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop starting tiles and abort running ones once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Validate a numeric range and run it
    pub async fn run_range(
        &self,
        start: u64,
        end: u64,
        inclusive: bool,
        options: &BatchOptions,
    ) -> Result<Vec<BatchResult>, BatchError> {
        let range = TileRange::new(start, end, inclusive)?;
        self.run(range.tile_ids(), options).await
    }

    /// One result per input id, in input order, whatever order tiles finish in
    pub async fn run(
        &self,
        tile_ids: Vec<TileId>,
        options: &BatchOptions,
    ) -> Result<Vec<BatchResult>, BatchError> {
        if tile_ids.is_empty() {
            return Err(BatchError::EmptyInput);
        }

        let concurrency = options.concurrency.max(1);
        info!(
            product = self.pipeline.product().name(),
            tiles = tile_ids.len(),
            concurrency,
            "Starting batch"
        );

        let mut seen = HashSet::new();
        let results = stream::iter(tile_ids.into_iter().map(|tile_id| {
            let duplicate = !seen.insert(tile_id.clone());
            self.run_tile(tile_id, duplicate, options)
        }))
        .buffered(concurrency)
        .collect::<Vec<_>>()
        .await;

        Ok(results)
    }

    async fn run_tile(&self, tile_id: TileId, duplicate: bool, options: &BatchOptions) -> BatchResult {
        if duplicate {
            return BatchResult {
                tile_id,
                outcome: TileOutcome::Skipped {
                    reason: "duplicate tile id in batch".to_string(),
                },
            };
        }

        if self.cancel.is_cancelled() {
            return failed(tile_id, TileError::Cancelled);
        }

        let metrics = self.pipeline.metrics().clone();
        metrics.tile_started();

        let pipeline = self.pipeline.clone();
        let id = tile_id.clone();
        let (extract, inspect) = (options.extract, options.inspect);
        let handle = tokio::spawn(async move { pipeline.run(&id, extract, inspect).await });
        let abort = handle.abort_handle();

        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                // dropping the tile future also stops a running extraction at its next entry
                abort.abort();
                Err(TileError::Cancelled)
            }
            joined = handle => match joined {
                Ok(result) => result,
                Err(e) => Err(TileError::Internal(format!("tile task failed: {}", e))),
            },
        };

        match result {
            Ok(output) => {
                metrics.tile_succeeded();
                succeeded(tile_id, output)
            }
            Err(error) => {
                metrics.tile_failed();
                warn!(tile_id = %tile_id, kind = %error.kind(), error = %error, "Tile failed");
                failed(tile_id, error)
            }
        }
    }
}

fn succeeded(tile_id: TileId, output: TileOutput) -> BatchResult {
    BatchResult {
        tile_id,
        outcome: TileOutcome::Success {
            job_id: output.job_id,
            archive: output.archive,
            extracted: output.extracted,
            payload: output.payload,
        },
    }
}

fn failed(tile_id: TileId, error: TileError) -> BatchResult {
    BatchResult {
        tile_id,
        outcome: TileOutcome::Failed {
            kind: error.kind(),
            message: error.to_string(),
        },
    }
}
