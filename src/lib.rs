#![warn(missing_docs)]

//! Normalizes TMX, JSON and legacy script tile maps into one canonical
//! map/layer/tile model, plus the brush and flood-fill editing primitives
//! that work on it.

mod brush;
mod editor;
mod error;
mod import;
mod ir_map;
mod layer;
mod loader {
    pub mod json_loader;
    pub mod legacy_loader;
    pub mod tmx_loader;
}
mod map;
mod normalize;
mod resolver;
mod spatial {
    pub mod region;
}
mod store;
mod tileset;

pub use brush::{Brush, BrushSelection};
pub use editor::{calculate_tile_position, fill_region, EditSession, MapMetadata, Tool};
pub use error::MapError;
pub use import::{
    companion_path, import_and_commit, import_file, ImportConfig, ImportSource, ImportedMap,
    Importer, MapFormat,
};
pub use ir_map::{IrCell, IrLayer, IrLayerKind, IrMap, IrTileRef, IrTileset};
pub use layer::{Cell, CellValue, FieldType, Layer, LayerData, LayerType, TileBrush};
pub use loader::json_loader::decode_json_str;
pub use loader::legacy_loader::{
    decode_legacy_str, parse_tile_ref, scan_assignments, Assignment, Literal,
};
pub use loader::tmx_loader::decode_tmx_str;
pub use map::{
    CanonicalBrush, CanonicalDocument, CanonicalEntry, CanonicalLayer, CanonicalMap, MapData,
    TileMap, TilePlacement,
};
pub use normalize::{normalize_layer, remap_legacy_field_type, MapDims, LEGACY_LAYERS};
pub use resolver::{
    names_match, FsImageProbe, ImageProbe, MissingTileset, NoImages, Resolution,
    ResolvedTilesets, ResolverOptions, TilesetResolver,
};
pub use spatial::region::{
    cells_match, connected_region, connected_region_ordered, Bounds, Region, NEIGHBORS,
};
pub use store::{InMemoryStore, MapSink, TilesetStore};
pub use tileset::{
    sequential_to_local, GidRange, GidTable, GidTile, TileSet, DEFAULT_TILE_SIZE, FLIP_D, FLIP_H,
    FLIP_V, GID_MASK,
};
