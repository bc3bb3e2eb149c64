use serde_json::{Map, Value};

use super::{required_field, start_query, Product};
use crate::portal::models::{Query, TileId, TileMetadata};

/// bDOM image-matched surface model tiles, packaged per acquisition year and 10km cell
#[derive(Debug, Clone, Copy, Default)]
pub struct Orthophoto;

impl Product for Orthophoto {
    fn name(&self) -> &'static str {
        "bdom"
    }

    fn description(&self) -> &'static str {
        "image-based surface model tiles (bDOM)"
    }

    fn detail_query(&self, tile_id: &TileId) -> Query {
        vec![
            ("type", self.name().to_string()),
            ("id", tile_id.to_string()),
            ("_uid", format!("{}{}", self.name(), tile_id)),
        ]
    }

    fn metadata(&self, tile_id: &TileId, object: &Map<String, Value>) -> Result<TileMetadata, String> {
        let mut metadata = TileMetadata::new(
            tile_id.clone(),
            required_field(object, "kachel_n")?,
            object.clone(),
        );
        metadata.grid_cell = Some(required_field(object, "kach10km")?);
        metadata.file_path = Some(required_field(object, "filepath")?);
        metadata.year = Some(required_field(object, "jahr")?);
        Ok(metadata)
    }

    fn start_query(&self, tile_id: &TileId, metadata: &TileMetadata) -> Query {
        let path = format!(
            "/data/geodaten/sh/bDOM/bDOM_{}/{}/{}/",
            metadata.year.as_deref().unwrap_or_default(),
            metadata.grid_cell.as_deref().unwrap_or_default(),
            metadata.file_path.as_deref().unwrap_or_default(),
        );
        start_query(path, "ebenen", tile_id, self.name())
    }

    fn payload_name(&self, metadata: &TileMetadata) -> Option<String> {
        Some(format!("{}.xyz", metadata.tile_name))
    }

    fn verify_tls_default(&self) -> bool {
        false
    }
}
