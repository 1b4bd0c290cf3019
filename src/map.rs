use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MapError;
use crate::layer::{Cell, CellValue, Layer, LayerData, LayerType};
use crate::tileset::TileSet;

/// Canonical map header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileMap {
    pub uuid: Uuid,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Player spawn cell, when the source format has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn: Option<Cell>,
}

/// A map with its layers and every tileset those layers reference; the unit
/// handed to persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct MapData {
    pub map: TileMap,
    /// Sorted by z.
    pub layers: Vec<Layer>,
    pub tilesets: Vec<TileSet>,
}

/// One placed tile, flattened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilePlacement {
    pub x: u32,
    pub y: u32,
    pub tileset: Uuid,
    pub tile_x: u32,
    pub tile_y: u32,
}

impl MapData {
    pub fn tileset(&self, uuid: &Uuid) -> Option<&TileSet> {
        self.tilesets.iter().find(|t| t.uuid == *uuid)
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn tile_count(&self) -> usize {
        self.layers.iter().map(|l| l.data.len()).sum()
    }

    /// Every tile of every layer.
    pub fn placements(&self) -> Vec<TilePlacement> {
        self.layers
            .iter()
            .flat_map(|l| l.data.tiles())
            .map(|(cell, brush)| TilePlacement {
                x: cell.x,
                y: cell.y,
                tileset: brush.tileset,
                tile_x: brush.tile_x,
                tile_y: brush.tile_y,
            })
            .collect()
    }

    /// Checks the invariants persistence relies on.
    pub fn validate(&self) -> Result<(), MapError> {
        let m = &self.map;
        if m.width == 0 || m.height == 0 {
            return Err(MapError::InvalidMap(format!(
                "map '{}' has size {}x{}",
                m.name, m.width, m.height
            )));
        }
        if m.tile_width == 0 || m.tile_height == 0 {
            return Err(MapError::InvalidMap(format!(
                "map '{}' has tile size {}x{}",
                m.name, m.tile_width, m.tile_height
            )));
        }
        if let Some(spawn) = m.spawn {
            if spawn.x >= m.width || spawn.y >= m.height {
                return Err(MapError::InvalidMap(format!(
                    "spawn point {spawn} is outside the {}x{} map",
                    m.width, m.height
                )));
            }
        }

        let tilesets: HashMap<Uuid, &TileSet> =
            self.tilesets.iter().map(|t| (t.uuid, t)).collect();
        for layer in &self.layers {
            if layer.kind.holds_field_types() != matches!(layer.data, LayerData::FieldTypes(_)) {
                return Err(MapError::MixedLayerData(layer.name.clone()));
            }
            let (w, h) = layer.extent(m.width, m.height);
            for (cell, value) in layer.data.sorted() {
                if cell.x >= w || cell.y >= h {
                    return Err(MapError::CellOutOfBounds {
                        layer: layer.name.clone(),
                        x: i64::from(cell.x),
                        y: i64::from(cell.y),
                    });
                }
                let CellValue::Tile(brush) = value else {
                    continue;
                };
                let ts = tilesets.get(&brush.tileset).ok_or_else(|| {
                    MapError::UnresolvedTileset {
                        layer: layer.name.clone(),
                        tileset: brush.tileset.to_string(),
                    }
                })?;
                if !ts.contains_tile(brush.tile_x, brush.tile_y) {
                    return Err(MapError::TileOutOfTileset {
                        layer: layer.name.clone(),
                        tileset: ts.name.clone(),
                        x: cell.x,
                        y: cell.y,
                        tile_x: brush.tile_x,
                        tile_y: brush.tile_y,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn to_canonical(&self) -> CanonicalDocument {
        CanonicalDocument {
            map: CanonicalMap {
                name: self.map.name.clone(),
                width: self.map.width,
                height: self.map.height,
                tile_width: self.map.tile_width,
                tile_height: self.map.tile_height,
                uuid: Some(self.map.uuid),
                spawn: self.map.spawn,
            },
            layers: self.layers.iter().map(CanonicalLayer::from_layer).collect(),
            tilesets: self.tilesets.clone(),
        }
    }

    /// Canonical interchange JSON, entries in row-major order.
    pub fn to_canonical_json(&self) -> Result<String, MapError> {
        Ok(serde_json::to_string_pretty(&self.to_canonical())?)
    }
}

/// Serialized form of [`MapData`].
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalDocument {
    pub map: CanonicalMap,
    pub layers: Vec<CanonicalLayer>,
    pub tilesets: Vec<TileSet>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CanonicalMap {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn: Option<Cell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CanonicalLayer {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LayerType,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub visible: bool,
    pub opacity: f32,
    pub data: Vec<CanonicalEntry>,
}

impl CanonicalLayer {
    fn from_layer(layer: &Layer) -> Self {
        CanonicalLayer {
            name: layer.name.clone(),
            kind: layer.kind,
            x: layer.x,
            y: layer.y,
            z: layer.z,
            width: layer.width,
            height: layer.height,
            visible: layer.visible,
            opacity: layer.opacity,
            data: layer
                .data
                .sorted()
                .into_iter()
                .map(|(cell, value)| match value {
                    CellValue::Tile(b) => CanonicalEntry::Tile {
                        x: cell.x,
                        y: cell.y,
                        brush: CanonicalBrush {
                            tileset: b.tileset,
                            tile_x: b.tile_x,
                            tile_y: b.tile_y,
                        },
                    },
                    CellValue::Field(f) => CanonicalEntry::Field {
                        x: cell.x,
                        y: cell.y,
                        field_type: f.0,
                    },
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CanonicalEntry {
    Tile {
        x: u32,
        y: u32,
        brush: CanonicalBrush,
    },
    Field {
        x: u32,
        y: u32,
        #[serde(rename = "fieldType")]
        field_type: u8,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct CanonicalBrush {
    pub tileset: Uuid,
    #[serde(rename = "tileX")]
    pub tile_x: u32,
    #[serde(rename = "tileY")]
    pub tile_y: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{FieldType, TileBrush};
    use pretty_assertions::assert_eq;

    fn sample() -> MapData {
        let ts = TileSet {
            uuid: Uuid::from_u128(0x42),
            name: "forest".into(),
            image_width: 128,
            image_height: 128,
            tile_width: 32,
            tile_height: 32,
            image_path: "forest.png".into(),
            margin: 0,
            spacing: 0,
        };
        let mut floor = Layer::new("floor", LayerType::Floor, 1);
        floor.data.insert(
            Cell::new(1, 0),
            CellValue::Tile(TileBrush {
                tileset: ts.uuid,
                tile_x: 3,
                tile_y: 2,
            }),
        );
        let mut fields = Layer::new("field_type", LayerType::FieldType, 5);
        fields
            .data
            .insert(Cell::new(0, 1), CellValue::Field(FieldType::BLOCKED));
        MapData {
            map: TileMap {
                uuid: Uuid::from_u128(1),
                name: "town".into(),
                width: 2,
                height: 2,
                tile_width: 32,
                tile_height: 32,
                spawn: None,
            },
            layers: vec![floor, fields],
            tilesets: vec![ts],
        }
    }

    #[test]
    fn canonical_json_uses_interchange_keys() {
        let json: serde_json::Value =
            serde_json::from_str(&sample().to_canonical_json().unwrap()).unwrap();

        assert_eq!(json["map"]["tile_width"], 32);
        assert_eq!(json["layers"][0]["type"], "floor");
        assert_eq!(
            json["layers"][0]["data"][0],
            serde_json::json!({
                "x": 1, "y": 0,
                "brush": {"tileset": "00000000-0000-0000-0000-000000000042", "tileX": 3, "tileY": 2}
            })
        );
        assert_eq!(
            json["layers"][1]["data"][0],
            serde_json::json!({"x": 0, "y": 1, "fieldType": 2})
        );
        assert_eq!(json["tilesets"][0]["image_width"], 128);
        assert!(json["map"].get("spawn").is_none());
    }

    #[test]
    fn validate_rejects_tiles_without_tileset() {
        let mut data = sample();
        data.tilesets.clear();
        assert!(matches!(
            data.validate(),
            Err(MapError::UnresolvedTileset { .. })
        ));
    }

    #[test]
    fn validate_rejects_spawn_outside_map() {
        let mut data = sample();
        data.map.spawn = Some(Cell::new(2, 0));
        assert!(matches!(data.validate(), Err(MapError::InvalidMap(_))));
    }
}
