//! Tile products offered by the portal
//!
//! Every product shares the same job pipeline; they only differ in how the detail
//! lookup and the job-start request are parameterised and which payload file the
//! finished archive contains.
//!
//! ## Key Components
//!
//! - [`Product`] - request construction for one product
//! - [`ProductRegistry`] - products keyed by their portal type tag
//! - [`Elevation`] (`dgm1`), [`Cadastre`] (`alkis`), [`Orthophoto`] (`bdom`)

mod cadastre;
mod elevation;
mod orthophoto;
mod registry;

pub use cadastre::Cadastre;
pub use elevation::Elevation;
pub use orthophoto::Orthophoto;
pub use registry::{ProductRegistry, RegistryError};

use serde_json::{Map, Value};
use std::fmt;

use crate::portal::models::{field_string, Query, TileId, TileMetadata};

/// Request construction for one tile product
pub trait Product: Send + Sync + fmt::Debug {
    /// Portal type tag (`type=` query parameter)
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Query of the tile-detail lookup
    fn detail_query(&self, tile_id: &TileId) -> Query {
        vec![("type", self.name().to_string()), ("id", tile_id.to_string())]
    }

    /// Pick the attributes needed for job submission out of the detail object
    fn metadata(&self, tile_id: &TileId, object: &Map<String, Value>) -> Result<TileMetadata, String>;

    /// Query of the job-start request (without the cache-busting timestamp)
    fn start_query(&self, tile_id: &TileId, metadata: &TileMetadata) -> Query;

    /// Name of the payload file inside the extracted archive
    fn payload_name(&self, metadata: &TileMetadata) -> Option<String>;

    /// Whether certificates are verified unless the configuration says otherwise
    fn verify_tls_default(&self) -> bool {
        true
    }

    /// Whether every request of a tile gets its own user agent
    fn rotate_user_agent(&self) -> bool {
        false
    }
}

pub(crate) fn required_field(object: &Map<String, Value>, key: &str) -> Result<String, String> {
    field_string(object, key).ok_or_else(|| format!("tile detail is missing field '{}'", key))
}

pub(crate) fn start_query(file_url: String, button_class: &str, tile_id: &TileId, product: &str) -> Query {
    vec![
        ("url", file_url),
        ("buttonClass", button_class.to_string()),
        ("id", tile_id.to_string()),
        ("type", product.to_string()),
        ("action", "start".to_string()),
    ]
}
