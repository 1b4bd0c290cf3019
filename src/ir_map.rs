// src/ir_map.rs
use uuid::Uuid;

use crate::layer::{FieldType, LayerType};

/// Format-level map as decoded by one of the loaders, before tileset resolution.
#[derive(Debug, Clone)]
pub struct IrMap {
    pub uuid: Option<Uuid>,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub tile_w: u32,
    pub tile_h: u32,
    pub spawn: Option<(u32, u32)>,
    pub tilesets: Vec<IrTileset>, // declaration order
    pub layers: Vec<IrLayer>,     // declaration order
}

/// Tileset as the input describes it.
#[derive(Debug, Clone)]
pub enum IrTileset {
    /// TMX atlas owning a GID range.
    Atlas {
        first_gid: u32,
        name: String,
        image: String,
        image_w: u32,
        image_h: u32,
        tile_w: u32,
        tile_h: u32,
        tilecount: Option<u32>,
        spacing: u32,
        margin: u32,
    },
    /// Full record shipped alongside a JSON export.
    Record {
        uuid: Option<Uuid>,
        name: String,
        image: String,
        image_w: u32,
        image_h: u32,
        tile_w: u32,
        tile_h: u32,
        spacing: u32,
        margin: u32,
    },
    /// Only a name; dimensions have to come from a store or an image.
    Named {
        uuid: Option<Uuid>,
        name: String,
        image_hint: Option<String>,
    },
}

impl IrTileset {
    pub fn name(&self) -> &str {
        match self {
            IrTileset::Atlas { name, .. }
            | IrTileset::Record { name, .. }
            | IrTileset::Named { name, .. } => name,
        }
    }
}

/// Tile reference in one of the three addressing schemes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrTileRef {
    /// TMX global id (flip flags may still be set).
    Gid(u32),
    /// Legacy `tileset/N.png`, N is 1-based.
    Sequential { tileset: String, id: u32 },
    /// Already local coordinates; `tileset` is a uuid string or a name.
    Local {
        tileset: String,
        tile_x: u32,
        tile_y: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrCell {
    pub x: i64,
    pub y: i64,
    pub tile: IrTileRef,
}

#[derive(Debug, Clone)]
pub enum IrLayerKind {
    /// Dense row-major GID grid.
    Grid {
        width: usize,
        height: usize,
        data: Vec<u32>,
    },
    /// Sparse tile references.
    Cells(Vec<IrCell>),
    /// Sparse canonical field types as `(x, y, value)`.
    FieldTypes(Vec<(i64, i64, FieldType)>),
    /// Legacy field codes as `(row, col, code)`, remapped during normalization.
    LegacyFieldCodes(Vec<(i64, i64, i64)>),
}

#[derive(Debug, Clone)]
pub struct IrLayer {
    pub name: String,
    pub layer_type: LayerType,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub visible: bool,
    pub opacity: f32,
    /// Drop the layer instead of emitting it with no cells.
    pub skip_if_empty: bool,
    pub kind: IrLayerKind,
}

impl IrLayer {
    pub fn new(name: impl Into<String>, layer_type: LayerType, z: i32, kind: IrLayerKind) -> Self {
        IrLayer {
            name: name.into(),
            layer_type,
            x: 0,
            y: 0,
            z,
            width: None,
            height: None,
            visible: true,
            opacity: 1.0,
            skip_if_empty: false,
            kind,
        }
    }
}
