//! Single-tile acquisition pipeline
//!
//! resolve -> submit -> poll -> fetch -> classify -> materialize, strictly in that
//! order for one tile. Every stage returns a [`TileError`] instead of panicking, so
//! the batch runner can record a failure and move on.

pub mod classify;
pub mod error;
pub mod fetch;
pub mod materialize;
pub mod poll;
pub mod resolve;
pub mod settings;
pub mod submit;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ErrorKind, TileError};
pub use materialize::MaterializedResult;
pub use settings::{FetchPolicy, PipelineSettings, RetryPolicy};

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Instrument};

use crate::observability::Metrics;
use crate::portal::{PortalApi, TileId};
use crate::products::Product;
use crate::useragent::UserAgentSource;

/// User-Agent choice for one tile: pinned for the whole tile, or fresh per request
pub struct TileAgent<'a> {
    source: &'a dyn UserAgentSource,
    pinned: Option<String>,
}

impl<'a> TileAgent<'a> {
    pub fn new(source: &'a dyn UserAgentSource, rotate_per_request: bool) -> Self {
        let pinned = (!rotate_per_request).then(|| source.next());
        Self { source, pinned }
    }

    pub fn current(&self) -> String {
        match &self.pinned {
            Some(value) => value.clone(),
            None => self.source.next(),
        }
    }
}

/// What a successful tile run leaves behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileOutput {
    pub job_id: String,
    pub mime: String,
    pub archive: PathBuf,
    pub extracted: Option<PathBuf>,
    pub payload: Option<String>,
}

/// The per-tile chain, shared by every worker of a batch
pub struct TilePipeline {
    portal: Arc<dyn PortalApi>,
    product: Arc<dyn Product>,
    user_agents: Arc<dyn UserAgentSource>,
    settings: PipelineSettings,
    metrics: Arc<Metrics>,
}

impl TilePipeline {
    pub fn new(
        portal: Arc<dyn PortalApi>,
        product: Arc<dyn Product>,
        user_agents: Arc<dyn UserAgentSource>,
        settings: PipelineSettings,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            portal,
            product,
            user_agents,
            settings,
            metrics,
        }
    }

    pub fn product(&self) -> &dyn Product {
        self.product.as_ref()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run the whole chain for one tile.
    ///
    /// `inspect` loads the product's payload file from the extracted tree and
    /// implies nothing unless `extract` is set as well.
    pub async fn run(
        &self,
        tile_id: &TileId,
        extract: bool,
        inspect: bool,
    ) -> Result<TileOutput, TileError> {
        let span = tracing::info_span!("tile", product = self.product.name(), tile_id = %tile_id);
        self.run_stages(tile_id, extract, inspect).instrument(span).await
    }

    async fn run_stages(
        &self,
        tile_id: &TileId,
        extract: bool,
        inspect: bool,
    ) -> Result<TileOutput, TileError> {
        let portal = self.portal.as_ref();
        let product = self.product.as_ref();
        let metrics = self.metrics.as_ref();
        let agent = TileAgent::new(self.user_agents.as_ref(), product.rotate_user_agent());

        let metadata = resolve::resolve(portal, product, tile_id, &agent).await?;
        let job = submit::submit(portal, product, &metadata, self.settings.submit, &agent, metrics).await?;
        let job = poll::poll_until_done(portal, job, self.settings.poll, &agent, metrics).await?;

        let url = job
            .ready_url()
            .ok_or_else(|| TileError::Internal("job finished without download url".to_string()))?
            .to_string();
        let bytes = fetch::fetch_archive(portal, &url, self.settings.fetch, metrics).await?;

        let staged = materialize::write_raw(&self.settings.staging_root, &job.job_id, &bytes).await?;
        let classification = classify::classify(&staged).await?;

        let payload_name = if inspect {
            product.payload_name(&metadata)
        } else {
            None
        };
        let result = materialize::materialize(
            &staged,
            &job.job_id,
            &classification.extension,
            extract,
            payload_name.as_deref(),
        )
        .await?;

        info!(
            job_id = %job.job_id,
            mime = %classification.mime,
            archive = %result.archive_path.display(),
            "Tile complete"
        );

        Ok(TileOutput {
            job_id: job.job_id,
            mime: classification.mime,
            archive: result.archive_path,
            extracted: result.extracted_dir,
            payload: result.payload,
        })
    }
}
