//! Persisted batch reports
//!
//! Every run writes `{root}/reports/{product}-{YYYYmmddTHHMMSS}.json`. A report is
//! enough to re-run only the failed tiles and to check the archives a run claimed
//! to have stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::batch::{BatchResult, BatchSummary, TileOutcome};
use crate::humanize::ByteSize;
use crate::portal::TileId;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report I/O at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed report {}: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub product: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<BatchResult>,
}

/// Something wrong with an archive a report lists as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyIssue {
    pub tile_id: TileId,
    pub path: PathBuf,
    pub problem: VerifyProblem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum VerifyProblem {
    Missing,
    TooSmall { size: u64 },
}

impl fmt::Display for VerifyProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyProblem::Missing => f.write_str("missing"),
            VerifyProblem::TooSmall { size } => write!(f, "too small ({})", ByteSize(*size)),
        }
    }
}

impl BatchReport {
    pub fn new(
        product: impl Into<String>,
        started_at: DateTime<Utc>,
        results: Vec<BatchResult>,
    ) -> Self {
        Self {
            product: product.into(),
            started_at,
            finished_at: Utc::now(),
            results,
        }
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_results(&self.results)
    }

    /// Tiles to hand to the next run
    pub fn failed_tile_ids(&self) -> Vec<TileId> {
        self.results
            .iter()
            .filter(|result| result.outcome.is_failed())
            .map(|result| result.tile_id.clone())
            .collect()
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}-{}.json",
            self.product,
            self.started_at.format("%Y%m%dT%H%M%S")
        )
    }

    /// Write the report below `{root}/reports/` and return its path
    pub async fn save(&self, root: &Path) -> Result<PathBuf, ReportError> {
        let dir = root.join("reports");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ReportError::Io {
                path: dir.clone(),
                source,
            })?;

        let path = dir.join(self.file_name());
        let json = serde_json::to_vec_pretty(self).map_err(|source| ReportError::Format {
            path: path.clone(),
            source,
        })?;

        tokio::fs::write(&path, json)
            .await
            .map_err(|source| ReportError::Io {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "Batch report written");
        Ok(path)
    }

    pub async fn load(path: &Path) -> Result<Self, ReportError> {
        let raw = tokio::fs::read(path).await.map_err(|source| ReportError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_slice(&raw).map_err(|source| ReportError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every stored archive exists and is at least `min_size` bytes
    pub async fn verify(&self, min_size: ByteSize) -> Vec<VerifyIssue> {
        let mut issues = Vec::new();

        for result in &self.results {
            let TileOutcome::Success { archive, .. } = &result.outcome else {
                continue;
            };

            let problem = match tokio::fs::metadata(archive).await {
                Err(_) => Some(VerifyProblem::Missing),
                Ok(meta) if meta.len() < min_size.as_u64() => {
                    Some(VerifyProblem::TooSmall { size: meta.len() })
                }
                Ok(_) => None,
            };

            if let Some(problem) = problem {
                warn!(
                    tile_id = %result.tile_id,
                    path = %archive.display(),
                    ?problem,
                    min_size = %min_size,
                    "Archive failed verification"
                );
                issues.push(VerifyIssue {
                    tile_id: result.tile_id.clone(),
                    path: archive.clone(),
                    problem,
                });
            }
        }

        issues
    }
}
