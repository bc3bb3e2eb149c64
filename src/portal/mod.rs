//! Client side of the portal's asynchronous job API
//!
//! Four request shapes are consumed: tile detail lookup, job start, job status and a
//! plain GET of the finished archive. [`PortalApi`] is the seam the pipeline talks to;
//! [`HttpPortal`] is the production implementation.

mod http;
pub mod models;

pub use http::{HttpPortal, HttpPortalConfig};
pub use models::{
    Job, JobStartResponse, JobState, JobStatusResponse, PortalReply, Query, TileDetailResponse,
    TileId, TileMetadata,
};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// HTTP-level failures. A non-2xx status and an empty body both mean "no usable payload".
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("request timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Transport(String),

    #[error("portal returned an empty body")]
    EmptyBody,

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid portal url: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, PortalError>;

/// Portal operations used by the acquisition pipeline
#[async_trait]
pub trait PortalApi: Send + Sync {
    /// Read-only metadata lookup for one tile
    async fn tile_detail(&self, query: &Query, user_agent: &str) -> Result<TileDetailResponse>;

    /// Ask the portal to start packaging a tile
    async fn start_job(&self, query: &Query, user_agent: &str) -> Result<JobStartResponse>;

    /// Fetch the current state of a job
    async fn job_status(&self, job_id: &str, user_agent: &str) -> Result<JobStatusResponse>;

    /// Download the finished archive
    async fn download(&self, url: &str) -> Result<Bytes>;
}
