//! Batch orchestration over many tiles
//!
//! A batch is an ordered list of tile ids. Each tile runs the full
//! [`TilePipeline`](crate::pipeline::TilePipeline) in isolation and ends up as exactly
//! one [`BatchResult`], in input order. Only malformed input (`start > end`, nothing
//! to do) fails the batch as a whole, and it does so before any request is sent.

mod range;
mod runner;

pub use range::{MAX_BATCH_TILES, TileRange};
pub use runner::BatchRunner;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::ErrorKind;
use crate::portal::TileId;

/// Input errors that reject a whole batch
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("invalid tile range: start {start} is greater than end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("no tile ids to process")]
    EmptyInput,

    #[error("tile range {start}..{end} is larger than the limit of {max} tiles per batch")]
    RangeTooLarge { start: u64, end: u64, max: u64 },
}

#[derive(Debug, Clone, bon::Builder)]
pub struct BatchOptions {
    /// Unpack every archive into `{job}/`
    #[builder(default)]
    pub extract: bool,
    /// Load the product payload file after extraction
    #[builder(default)]
    pub inspect: bool,
    /// Tiles processed at the same time
    #[builder(default = 1)]
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TileOutcome {
    Success {
        job_id: String,
        archive: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extracted: Option<PathBuf>,
        #[serde(skip)]
        payload: Option<String>,
    },
    Skipped {
        reason: String,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl TileOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, TileOutcome::Failed { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TileOutcome::Success { .. })
    }
}

/// Outcome of one tile of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub tile_id: TileId,
    #[serde(flatten)]
    pub outcome: TileOutcome,
}

/// Counts plus the failed tiles, enough to re-run only those
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<(TileId, ErrorKind)>,
}

impl BatchSummary {
    pub fn from_results(results: &[BatchResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };

        for result in results {
            match &result.outcome {
                TileOutcome::Success { .. } => summary.succeeded += 1,
                TileOutcome::Skipped { .. } => summary.skipped += 1,
                TileOutcome::Failed { kind, .. } => {
                    summary.failed += 1;
                    summary.failures.push((result.tile_id.clone(), *kind));
                }
            }
        }

        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tiles: {} succeeded, {} skipped, {} failed",
            self.total, self.succeeded, self.skipped, self.failed
        )?;
        for (tile_id, kind) in &self.failures {
            write!(f, "\n  {}: {}", tile_id, kind)?;
        }
        Ok(())
    }
}
