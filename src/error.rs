use std::path::PathBuf;

use thiserror::Error;

use crate::resolver::MissingTileset;

/// Errors produced while importing or validating a map.
#[derive(Debug, Error)]
pub enum MapError {
    /// File I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Malformed JSON input
    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Malformed XML input
    #[error("failed to parse XML: {0}")]
    Xml(String),
    /// A TMX layer uses a data encoding other than CSV
    #[error("unsupported encoding '{encoding}' in layer '{layer}' (only csv is supported)")]
    UnsupportedEncoding { layer: String, encoding: String },
    /// The input file type is not one of the supported formats
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    /// JSON input matches neither the standard nor the flat shape
    #[error("JSON input matches neither the standard {{map, layers, tilesets}} nor the flat {{name, width, height, layers}} shape")]
    UnrecognizedJsonShape,
    /// Structural problem with the map itself
    #[error("invalid map: {0}")]
    InvalidMap(String),
    /// Layer data length does not match width * height
    #[error("layer '{layer}' has {actual} cells, expected {expected}")]
    InvalidLayerSize {
        layer: String,
        expected: usize,
        actual: usize,
    },
    /// A GID that no declared tileset range contains
    #[error("GID {gid} in layer '{layer}' is not covered by any tileset")]
    InvalidTileGid { layer: String, gid: u32 },
    /// Tileset record that cannot be used for coordinate math
    #[error("invalid tileset '{name}': {reason}")]
    InvalidTileset { name: String, reason: String },
    /// Sequential ids need the tileset's row width
    #[error("tiles per row unknown for tileset '{tileset}'")]
    UnknownTilesPerRow { tileset: String },
    /// Sequential ids are 1-based
    #[error("invalid sequential tile id {id} for tileset '{tileset}'")]
    InvalidSequentialId { tileset: String, id: u32 },
    /// Layer type string is not one of background, floor, sky, field_type
    #[error("unknown layer type '{0}'")]
    UnknownLayerType(String),
    /// Legacy field-type code outside the remap table
    #[error("unknown field type code {code} at row {row}, column {col}")]
    UnknownFieldTypeCode { row: u32, col: u32, code: i64 },
    /// A cell lies outside its layer's extent
    #[error("cell ({x}, {y}) in layer '{layer}' is outside the layer bounds")]
    CellOutOfBounds { layer: String, x: i64, y: i64 },
    /// Local tile coordinates outside the tileset image
    #[error("tile ({tile_x}, {tile_y}) at cell ({x}, {y}) in layer '{layer}' is outside tileset '{tileset}'")]
    TileOutOfTileset {
        layer: String,
        tileset: String,
        x: u32,
        y: u32,
        tile_x: u32,
        tile_y: u32,
    },
    /// A layer mixes tile and field-type entries
    #[error("layer '{0}' mixes tile and field type entries")]
    MixedLayerData(String),
    /// A tile references a tileset that is not part of the resolved set
    #[error("layer '{layer}' references tileset '{tileset}' which was not resolved")]
    UnresolvedTileset { layer: String, tileset: String },
    /// Auto-create is disabled and these tilesets have no existing record
    #[error("missing tilesets: {}", .names.join(", "))]
    MissingTilesets { names: Vec<String> },
    /// Tilesets with no record and no locatable image; recoverable by uploading them
    #[error("tilesets require an image upload: {}", .tilesets.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", "))]
    TilesetsRequireUpload { tilesets: Vec<MissingTileset> },
    /// Reading an image's dimensions failed
    #[error("failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    /// Malformed legacy script line
    #[error("legacy script line {line}: {message}")]
    Legacy { line: usize, message: String },
    /// Malformed TOML configuration
    #[error("invalid import configuration: {0}")]
    Config(#[from] toml::de::Error),
    /// The sink refused the commit
    #[error("commit rejected: {0}")]
    Commit(String),
}

impl MapError {
    /// True for conditions the caller can fix by supplying tileset images and retrying.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MapError::TilesetsRequireUpload { .. })
    }

    pub(crate) fn xml(err: impl std::fmt::Display) -> Self {
        MapError::Xml(err.to_string())
    }
}
