use tracing::{debug, warn};

use super::error::TileError;
use super::TileAgent;
use crate::portal::{PortalApi, PortalReply, TileId, TileMetadata};
use crate::products::Product;

/// Look up the portal-side attributes of a tile. Never retried.
pub async fn resolve(
    portal: &dyn PortalApi,
    product: &dyn Product,
    tile_id: &TileId,
    agent: &TileAgent<'_>,
) -> Result<TileMetadata, TileError> {
    let failed = |message: String| TileError::Resolution {
        tile_id: tile_id.clone(),
        message,
    };

    let query = product.detail_query(tile_id);
    let response = portal
        .tile_detail(&query, &agent.current())
        .await
        .map_err(|e| failed(e.to_string()))?;

    match response.into_reply() {
        PortalReply::Accepted(object) => {
            let metadata = product.metadata(tile_id, &object).map_err(failed)?;
            debug!(tile_name = %metadata.tile_name, "Tile resolved");
            Ok(metadata)
        }
        PortalReply::Rejected { message } => {
            warn!(%message, "Tile lookup rejected");
            Err(failed(message))
        }
    }
}
