use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::portal::TileId;

/// Stable, serializable name of a [`TileError`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Resolution,
    Submission,
    Poll,
    JobFailed,
    PollTimeout,
    Fetch,
    Classification,
    UnsupportedFormat,
    Storage,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Resolution => "resolution",
            ErrorKind::Submission => "submission",
            ErrorKind::Poll => "poll",
            ErrorKind::JobFailed => "job_failed",
            ErrorKind::PollTimeout => "poll_timeout",
            ErrorKind::Fetch => "fetch",
            ErrorKind::Classification => "classification",
            ErrorKind::UnsupportedFormat => "unsupported_format",
            ErrorKind::Storage => "storage",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything that can end a single tile's pipeline
#[derive(Debug, Error)]
pub enum TileError {
    #[error("tile {tile_id}: resolution failed: {message}")]
    Resolution { tile_id: TileId, message: String },

    #[error("tile {tile_id}: job submission failed after {attempts} attempt(s): {message}")]
    Submission {
        tile_id: TileId,
        attempts: u32,
        message: String,
    },

    #[error("job {job_id}: status request failed: {message}")]
    Poll { job_id: String, message: String },

    #[error("job {job_id}: portal reported failure: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("job {job_id}: not done after {attempts} status request(s)")]
    PollTimeout { job_id: String, attempts: u32 },

    #[error("download of {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("cannot derive a file extension from content type '{mime}'")]
    Classification { mime: String },

    #[error("no unpack strategy for '.{extension}' archives")]
    UnsupportedFormat { extension: String },

    #[error("I/O error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl TileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TileError::Resolution { .. } => ErrorKind::Resolution,
            TileError::Submission { .. } => ErrorKind::Submission,
            TileError::Poll { .. } => ErrorKind::Poll,
            TileError::JobFailed { .. } => ErrorKind::JobFailed,
            TileError::PollTimeout { .. } => ErrorKind::PollTimeout,
            TileError::Fetch { .. } => ErrorKind::Fetch,
            TileError::Classification { .. } => ErrorKind::Classification,
            TileError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            TileError::Storage { .. } => ErrorKind::Storage,
            TileError::Cancelled => ErrorKind::Cancelled,
            TileError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TileError::Storage {
            path: path.into(),
            source,
        }
    }
}
