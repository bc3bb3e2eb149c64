use serde_json::{Map, Value};

use super::{required_field, start_query, Product};
use crate::portal::models::{Query, TileId, TileMetadata};

/// ALKIS cadastral parcels, one gzipped NAS/XML file per `flur`
#[derive(Debug, Clone, Copy, Default)]
pub struct Cadastre;

impl Product for Cadastre {
    fn name(&self) -> &'static str {
        "alkis"
    }

    fn description(&self) -> &'static str {
        "ALKIS cadastral parcels (gzipped XML per flur)"
    }

    fn metadata(&self, tile_id: &TileId, object: &Map<String, Value>) -> Result<TileMetadata, String> {
        let flur = required_field(object, "flur")?;
        Ok(TileMetadata::new(tile_id.clone(), flur, object.clone()))
    }

    fn start_query(&self, tile_id: &TileId, metadata: &TileMetadata) -> Query {
        start_query(format!("{}.xml.gz", metadata.tile_name), "file1", tile_id, self.name())
    }

    fn payload_name(&self, metadata: &TileMetadata) -> Option<String> {
        Some(format!("{}.xml", metadata.tile_name))
    }

    fn verify_tls_default(&self) -> bool {
        false
    }
}
