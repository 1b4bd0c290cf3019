use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MapError;

/// Cell coordinates in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
}

impl Cell {
    pub const fn new(x: u32, y: u32) -> Self {
        Cell { x, y }
    }

    /// Row-major ordering key.
    pub fn row_major(&self) -> (u32, u32) {
        (self.y, self.x)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    Background,
    Floor,
    Sky,
    FieldType,
}

impl LayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::Background => "background",
            LayerType::Floor => "floor",
            LayerType::Sky => "sky",
            LayerType::FieldType => "field_type",
        }
    }

    pub fn holds_field_types(&self) -> bool {
        matches!(self, LayerType::FieldType)
    }
}

impl FromStr for LayerType {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "background" => Ok(LayerType::Background),
            "floor" => Ok(LayerType::Floor),
            "sky" => Ok(LayerType::Sky),
            "field_type" | "fieldtype" | "field-type" => Ok(LayerType::FieldType),
            _ => Err(MapError::UnknownLayerType(s.to_owned())),
        }
    }
}

/// Reference to one tile image: tileset plus local grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileBrush {
    pub tileset: Uuid,
    pub tile_x: u32,
    pub tile_y: u32,
}

/// Walkability/collision class of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldType(pub u8);

impl FieldType {
    pub const WALKABLE: FieldType = FieldType(1);
    pub const BLOCKED: FieldType = FieldType(2);
    pub const WALKABLE_WITH_MONSTERS: FieldType = FieldType(3);
}

/// Value of one occupied cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellValue {
    Tile(TileBrush),
    Field(FieldType),
}

/// Sparse cell storage. A layer holds tiles or field types, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerData {
    Tiles(HashMap<Cell, TileBrush>),
    FieldTypes(HashMap<Cell, FieldType>),
}

impl LayerData {
    pub fn for_type(kind: LayerType) -> Self {
        if kind.holds_field_types() {
            LayerData::FieldTypes(HashMap::new())
        } else {
            LayerData::Tiles(HashMap::new())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            LayerData::Tiles(m) => m.len(),
            LayerData::FieldTypes(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, cell: Cell) -> Option<CellValue> {
        match self {
            LayerData::Tiles(m) => m.get(&cell).copied().map(CellValue::Tile),
            LayerData::FieldTypes(m) => m.get(&cell).copied().map(CellValue::Field),
        }
    }

    /// Inserts a value of the layer's own kind. Returns `false` (and stores nothing)
    /// when the value kind does not match the layer.
    pub fn insert(&mut self, cell: Cell, value: CellValue) -> bool {
        match (self, value) {
            (LayerData::Tiles(m), CellValue::Tile(t)) => {
                m.insert(cell, t);
                true
            }
            (LayerData::FieldTypes(m), CellValue::Field(f)) => {
                m.insert(cell, f);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, cell: Cell) -> Option<CellValue> {
        match self {
            LayerData::Tiles(m) => m.remove(&cell).map(CellValue::Tile),
            LayerData::FieldTypes(m) => m.remove(&cell).map(CellValue::Field),
        }
    }

    /// Entries in row-major order.
    pub fn sorted(&self) -> Vec<(Cell, CellValue)> {
        let mut out: Vec<(Cell, CellValue)> = match self {
            LayerData::Tiles(m) => m.iter().map(|(c, t)| (*c, CellValue::Tile(*t))).collect(),
            LayerData::FieldTypes(m) => {
                m.iter().map(|(c, f)| (*c, CellValue::Field(*f))).collect()
            }
        };
        out.sort_unstable_by_key(|(c, _)| c.row_major());
        out
    }

    pub fn tiles(&self) -> impl Iterator<Item = (Cell, TileBrush)> + '_ {
        let map = match self {
            LayerData::Tiles(m) => Some(m),
            LayerData::FieldTypes(_) => None,
        };
        map.into_iter().flatten().map(|(c, t)| (*c, *t))
    }
}

/// Canonical layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub uuid: Uuid,
    pub name: String,
    pub kind: LayerType,
    pub x: i32,
    pub y: i32,
    /// Paint order, lower first.
    pub z: i32,
    /// Explicit size override; `None` means the map's size.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub visible: bool,
    pub opacity: f32,
    pub data: LayerData,
}

impl Layer {
    pub fn new(name: impl Into<String>, kind: LayerType, z: i32) -> Self {
        Layer {
            uuid: Uuid::new_v4(),
            name: name.into(),
            kind,
            x: 0,
            y: 0,
            z,
            width: None,
            height: None,
            visible: true,
            opacity: 1.0,
            data: LayerData::for_type(kind),
        }
    }

    /// Cell extent of the layer inside a map of the given size.
    pub fn extent(&self, map_width: u32, map_height: u32) -> (u32, u32) {
        (
            self.width.unwrap_or(map_width),
            self.height.unwrap_or(map_height),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
