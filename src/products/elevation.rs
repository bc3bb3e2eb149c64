use serde_json::{Map, Value};

use super::{required_field, start_query, Product};
use crate::portal::models::{Query, TileId, TileMetadata};

/// DGM1 digital elevation model, delivered as zipped `.xyz` point grids
#[derive(Debug, Clone, Copy, Default)]
pub struct Elevation;

impl Product for Elevation {
    fn name(&self) -> &'static str {
        "dgm1"
    }

    fn description(&self) -> &'static str {
        "1m digital elevation model (xyz point grid)"
    }

    fn metadata(&self, tile_id: &TileId, object: &Map<String, Value>) -> Result<TileMetadata, String> {
        let tile_name = required_field(object, "kachelname")?;
        Ok(TileMetadata::new(tile_id.clone(), tile_name, object.clone()))
    }

    fn start_query(&self, tile_id: &TileId, metadata: &TileMetadata) -> Query {
        start_query(format!("{}.xyz", metadata.tile_name), "file1", tile_id, self.name())
    }

    fn payload_name(&self, metadata: &TileMetadata) -> Option<String> {
        Some(format!("{}.xyz", metadata.tile_name))
    }

    fn rotate_user_agent(&self) -> bool {
        true
    }
}
